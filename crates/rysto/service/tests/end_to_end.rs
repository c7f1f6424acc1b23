use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration as ChronoDuration;
use rysto_auth::{GateMode, TokenCodec, TOKEN_ISSUER};
use rysto_service::{
    auth_router, story_router, vote_router, AuthSettings, AuthState, Metrics, Platform,
    StorageHandles, StoryState, VoteState,
};
use rysto_storage::{
    ContentStore, ContinuationFilter, ContinuationPatch, ContinuationStore, StorageResult,
    StoryFilter, StoryPatch, StoryStore, WriteOutcome,
};
use rysto_types::{Clock, Continuation, ContinuationId, Identity, Story, StoryId, SystemClock};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(30);

struct Rysto {
    platform: Platform,
    auth: Router,
    stories: Router,
    votes: Router,
}

impl Rysto {
    fn new() -> Self {
        Self::with_content(|content| content, TIMEOUT)
    }

    /// Wrap the content store and give the story service its own deadline.
    fn with_content<F>(wrap: F, story_timeout: Duration) -> Self
    where
        F: FnOnce(Arc<dyn ContentStore>) -> Arc<dyn ContentStore>,
    {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let codec = TokenCodec::new("end-to-end-secret", TOKEN_ISSUER).unwrap();
        let mut storage = StorageHandles::memory_with_clock(clock.clone());
        storage.content = wrap(storage.content.clone());
        let platform = Platform::new(
            storage,
            Arc::new(codec),
            GateMode::Stateful,
            clock,
            Metrics::new().unwrap(),
        );
        let settings = AuthSettings {
            project_url: "rysto/auth".to_string(),
            session_ttl: ChronoDuration::hours(24),
            timeout: TIMEOUT,
        };

        Self {
            auth: auth_router(AuthState::new(&platform, settings)),
            stories: story_router(StoryState::new(&platform, story_timeout)),
            votes: vote_router(VoteState::new(&platform, TIMEOUT)),
            platform,
        }
    }

    /// Issue and register a token without going through password hashing.
    async fn session_for(&self, email: &str) -> String {
        let identity = Identity::new(email);
        let token = self
            .platform
            .codec
            .issue(&identity, self.platform.clock.now())
            .unwrap();
        self.platform
            .sessions()
            .register(&token, &identity, ChronoDuration::hours(1))
            .await
            .unwrap();
        token
    }
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn account_lifecycle() {
    let rysto = Rysto::new();
    let credentials = json!({"email": "a@b.c", "password": "secret1"});

    let (status, body) = call(&rysto.auth, "POST", "/register", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");

    let (status, body) = call(&rysto.auth, "POST", "/register", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");

    let (status, body) = call(
        &rysto.auth,
        "POST",
        "/login",
        None,
        Some(json!({"email": "a@b.c", "password": "wrong!!"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, body) = call(&rysto.auth, "POST", "/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(&rysto.auth, "GET", "/api/profile", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_email"], "a@b.c");
    assert_eq!(body["access_level"], "authenticated");
    assert_eq!(body["project_url"], "rysto/auth");

    let (status, body) = call(&rysto.auth, "POST", "/api/logout", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, body) = call(&rysto.auth, "GET", "/api/profile", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is no longer valid");
}

#[tokio::test]
async fn registration_validates_input() {
    let rysto = Rysto::new();

    let (status, _) = call(
        &rysto.auth,
        "POST",
        "/register",
        None,
        Some(json!({"email": "not-an-email", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &rysto.auth,
        "POST",
        "/register",
        None,
        Some(json!({"email": "a@b.c", "password": "short"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = rysto.auth.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_reject_bad_authorization() {
    let rysto = Rysto::new();

    let (status, body) = call(&rysto.stories, "GET", "/api/stories", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization header required");

    let request = Request::builder()
        .uri("/api/profile")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::empty())
        .unwrap();
    let response = rysto.auth.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = call(&rysto.votes, "GET", "/api/votes/x", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");

    // Signed correctly but never registered as a session.
    let token = rysto
        .platform
        .codec
        .issue(&Identity::new("ghost@a.io"), rysto.platform.clock.now())
        .unwrap();
    let (status, body) = call(&rysto.auth, "GET", "/api/profile", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is no longer valid");
}

#[tokio::test]
async fn story_continuation_accept_and_cascade() {
    let rysto = Rysto::new();
    let x = rysto.session_for("x@a.io").await;
    let y = rysto.session_for("y@a.io").await;

    let (status, story) = call(
        &rysto.stories,
        "POST",
        "/api/stories",
        Some(x.as_str()),
        Some(json!({"title": "Dawn", "content": "Once", "tags": ["fable"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(story["authorId"], "x@a.io");
    let story_id = story["id"].as_str().unwrap().to_string();

    let (status, cont) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/continuations"),
        Some(y.as_str()),
        Some(json!({"content": "then"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(cont["accepted"], false);
    let cont_id = cont["id"].as_str().unwrap().to_string();

    // Only the story author may accept.
    let (status, body) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/accept/{cont_id}"),
        Some(y.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "You cannot accept for this story");

    let (status, body) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/accept/{cont_id}"),
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Continuation accepted");
    assert_eq!(body["alreadyAccepted"], false);

    let (status, body) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/accept/{cont_id}"),
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyAccepted"], true);

    let (status, body) = call(
        &rysto.stories,
        "PUT",
        &format!("/api/stories/{story_id}/continuations/{cont_id}"),
        Some(y.as_str()),
        Some(json!({"content": "rewritten"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Unauthorized or continuation locked");

    let (status, thread) = call(
        &rysto.stories,
        "GET",
        &format!("/api/stories/{story_id}"),
        Some(y.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["story"]["acceptedContinuationId"], cont_id.as_str());
    assert_eq!(thread["continuations"][0]["accepted"], true);
    assert_eq!(thread["continuations"][0]["content"], "then");

    let (status, _) = call(
        &rysto.stories,
        "DELETE",
        &format!("/api/stories/{story_id}"),
        Some(y.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &rysto.stories,
        "DELETE",
        &format!("/api/stories/{story_id}"),
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Story and its continuations deleted");

    let (status, body) = call(
        &rysto.stories,
        "GET",
        &format!("/api/stories/{story_id}"),
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Story not found");
}

#[tokio::test]
async fn story_listing_and_bad_ids() {
    let rysto = Rysto::new();
    let x = rysto.session_for("x@a.io").await;
    let y = rysto.session_for("y@a.io").await;

    for (token, title) in [(&x, "Dawn"), (&y, "Dawn"), (&y, "Dusk")] {
        let (status, _) = call(
            &rysto.stories,
            "POST",
            "/api/stories",
            Some(token.as_str()),
            Some(json!({"title": title, "content": "text"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, all) = call(&rysto.stories, "GET", "/api/stories", Some(x.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, filtered) = call(
        &rysto.stories,
        "GET",
        "/api/stories?title=Dawn&authorId=y@a.io",
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let filtered = filtered.as_array().unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["story"]["authorId"], "y@a.io");

    let (status, _) = call(&rysto.stories, "GET", "/api/stories?title=", Some(x.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&rysto.stories, "GET", "/api/stories/nope", Some(x.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid story ID");

    let (status, _) = call(
        &rysto.stories,
        "POST",
        "/api/stories",
        Some(x.as_str()),
        Some(json!({"title": " ", "content": "text"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voting_once_per_reader() {
    let rysto = Rysto::new();
    let reader = rysto.session_for("r@a.io").await;
    let other = rysto.session_for("s@a.io").await;
    let cid = uuid_like();
    let uri = format!("/api/votes/{cid}");

    let (status, body) = call(&rysto.votes, "POST", &uri, Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Vote recorded");
    assert_eq!(body["vote"]["voterEmail"], "r@a.io");

    let (status, _) = call(&rysto.votes, "POST", &uri, Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&rysto.votes, "POST", &uri, Some(other.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, tally) = call(&rysto.votes, "GET", &uri, Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tally["count"], 2);

    let (status, body) = call(&rysto.votes, "DELETE", &uri, Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Vote deleted");
    assert_eq!(body["removed"], 1);

    let (status, body) = call(&rysto.votes, "DELETE", &uri, Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    let (status, body) = call(&rysto.votes, "POST", "/api/votes/not-a-uuid", Some(reader.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid continuation ID");
}

#[tokio::test]
async fn health_is_public() {
    let rysto = Rysto::new();
    for (router, service) in [
        (&rysto.auth, "auth"),
        (&rysto.stories, "stories"),
        (&rysto.votes, "voting"),
    ] {
        let (status, body) = call(router, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], service);
        assert_eq!(body["storage"], "memory");
    }
}

/// Content store whose continuation updates take `delay`.
struct SlowFlags {
    inner: Arc<dyn ContentStore>,
    delay: Duration,
}

#[async_trait]
impl StoryStore for SlowFlags {
    async fn insert_story(&self, story: Story) -> StorageResult<StoryId> {
        self.inner.insert_story(story).await
    }
    async fn get_story(&self, id: &StoryId) -> StorageResult<Option<Story>> {
        self.inner.get_story(id).await
    }
    async fn find_stories(&self, filter: &StoryFilter) -> StorageResult<Vec<Story>> {
        self.inner.find_stories(filter).await
    }
    async fn update_story(
        &self,
        filter: &StoryFilter,
        patch: StoryPatch,
    ) -> StorageResult<WriteOutcome> {
        self.inner.update_story(filter, patch).await
    }
    async fn delete_story(&self, filter: &StoryFilter) -> StorageResult<u64> {
        self.inner.delete_story(filter).await
    }
}

#[async_trait]
impl ContinuationStore for SlowFlags {
    async fn insert_continuation(&self, continuation: Continuation) -> StorageResult<ContinuationId> {
        self.inner.insert_continuation(continuation).await
    }
    async fn get_continuation(&self, id: &ContinuationId) -> StorageResult<Option<Continuation>> {
        self.inner.get_continuation(id).await
    }
    async fn find_continuations(
        &self,
        filter: &ContinuationFilter,
    ) -> StorageResult<Vec<Continuation>> {
        self.inner.find_continuations(filter).await
    }
    async fn update_continuation(
        &self,
        filter: &ContinuationFilter,
        patch: ContinuationPatch,
    ) -> StorageResult<WriteOutcome> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_continuation(filter, patch).await
    }
    async fn delete_continuation(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        self.inner.delete_continuation(filter).await
    }
    async fn delete_continuations(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        self.inner.delete_continuations(filter).await
    }
}

#[tokio::test]
async fn accept_past_its_deadline_still_lands_on_both_sides() {
    let rysto = Rysto::with_content(
        |inner| {
            Arc::new(SlowFlags {
                inner,
                delay: Duration::from_millis(300),
            })
        },
        Duration::from_millis(100),
    );
    let x = rysto.session_for("x@a.io").await;
    let y = rysto.session_for("y@a.io").await;

    let (_, story) = call(
        &rysto.stories,
        "POST",
        "/api/stories",
        Some(x.as_str()),
        Some(json!({"title": "Dawn", "content": "Once"})),
    )
    .await;
    let story_id = story["id"].as_str().unwrap().to_string();
    let (_, cont) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/continuations"),
        Some(y.as_str()),
        Some(json!({"content": "then"})),
    )
    .await;
    let cont_id = cont["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &rysto.stories,
        "POST",
        &format!("/api/stories/{story_id}/accept/{cont_id}"),
        Some(x.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "TIMEOUT");

    tokio::time::sleep(Duration::from_millis(600)).await;

    let (status, thread) = call(
        &rysto.stories,
        "GET",
        &format!("/api/stories/{story_id}"),
        Some(y.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["story"]["acceptedContinuationId"], cont_id.as_str());
    assert_eq!(thread["continuations"][0]["accepted"], true);

    let (status, _) = call(
        &rysto.stories,
        "DELETE",
        &format!("/api/stories/{story_id}/continuations/{cont_id}"),
        Some(y.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_token_works_across_services() {
    let rysto = Rysto::new();
    let credentials = json!({"email": "w@a.io", "password": "secret1"});
    let (status, _) = call(&rysto.auth, "POST", "/register", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&rysto.auth, "POST", "/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, story) = call(
        &rysto.stories,
        "POST",
        "/api/stories",
        Some(token.as_str()),
        Some(json!({"title": "Dawn", "content": "Once"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(story["authorId"], "w@a.io");

    let uri = format!("/api/votes/{}", uuid_like());
    let (status, body) = call(&rysto.votes, "POST", &uri, Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["vote"]["voterEmail"], "w@a.io");

    let (status, _) = call(&rysto.auth, "POST", "/api/logout", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&rysto.stories, "GET", "/api/stories", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is no longer valid");
    let (status, _) = call(&rysto.votes, "GET", &uri, Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn scrape(router: &Router) -> (StatusCode, String) {
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn metrics_count_requests_and_domain_events() {
    let rysto = Rysto::new();
    let credentials = json!({"email": "m@a.io", "password": "secret1"});
    call(&rysto.auth, "POST", "/register", None, Some(credentials.clone())).await;
    call(
        &rysto.auth,
        "POST",
        "/login",
        None,
        Some(json!({"email": "m@a.io", "password": "wrong!!"})),
    )
    .await;
    let (_, body) = call(&rysto.auth, "POST", "/login", None, Some(credentials)).await;
    let token = body["token"].as_str().unwrap().to_string();
    let uri = format!("/api/votes/{}", uuid_like());
    call(&rysto.votes, "POST", &uri, Some(token.as_str()), None).await;

    let (status, text) = scrape(&rysto.votes).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("rysto_registrations_total 1"));
    assert!(text.contains("rysto_logins_total{outcome=\"failure\"} 1"));
    assert!(text.contains("rysto_logins_total{outcome=\"success\"} 1"));
    assert!(text.contains("rysto_active_sessions 1"));
    assert!(text.contains("rysto_votes_cast_total 1"));
    assert!(text.contains("rysto_active_votes 1"));
    assert_eq!(
        request_count(&text, "voting", "/api/votes/:continuation_id", "201"),
        Some(1)
    );
    assert_eq!(request_count(&text, "auth", "/login", "401"), Some(1));
}

fn request_count(text: &str, service: &str, endpoint: &str, status: &str) -> Option<u64> {
    let labels = [
        format!("service=\"{service}\""),
        format!("endpoint=\"{endpoint}\""),
        format!("status=\"{status}\""),
    ];
    text.lines()
        .filter(|line| line.starts_with("rysto_http_requests_total{"))
        .find(|line| labels.iter().all(|label| line.contains(label.as_str())))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

fn uuid_like() -> String {
    rysto_types::ContinuationId::generate().to_string()
}
