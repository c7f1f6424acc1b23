use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONTENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `work` under a deadline. On expiry the future is dropped, so the
/// operation is abandoned and never retried.
pub async fn within<T, E, F>(limit: Duration, work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, E>>,
    ApiError: From<E>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "request deadline exceeded");
            Err(ApiError::Timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_inside_the_deadline() {
        let value = within(Duration::from_secs(1), async { Ok::<_, ApiError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn slow_work_times_out() {
        let result = within(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ApiError>(())
        })
        .await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }
}
