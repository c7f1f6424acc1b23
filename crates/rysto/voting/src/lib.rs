//! Rysto voting.
//!
//! Any authenticated reader may vote once per continuation. Votes are not
//! checked against the content service; a vote for an unknown continuation is
//! simply recorded.

#![deny(unsafe_code)]

use rysto_storage::{StorageError, VoteStore};
use rysto_types::{Clock, ContinuationId, Identity, Vote};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Already voted for this continuation")]
    AlreadyVoted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Votes for one continuation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub continuation_id: ContinuationId,
    pub count: usize,
    pub votes: Vec<Vote>,
}

#[derive(Clone)]
pub struct VoteService {
    votes: Arc<dyn VoteStore>,
    clock: Arc<dyn Clock>,
}

impl VoteService {
    pub fn new(votes: Arc<dyn VoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { votes, clock }
    }

    pub async fn cast(
        &self,
        continuation_id: ContinuationId,
        voter: &Identity,
    ) -> Result<Vote, VoteError> {
        let vote = Vote::new(continuation_id, voter.clone(), self.clock.now());
        match self.votes.insert_vote(vote.clone()).await {
            Ok(_) => {
                info!(%continuation_id, voter = %voter, "vote recorded");
                Ok(vote)
            }
            Err(err) if err.is_conflict() => Err(VoteError::AlreadyVoted),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn votes_for(&self, continuation_id: ContinuationId) -> Result<VoteTally, VoteError> {
        let votes = self.votes.find_votes(&continuation_id).await?;
        Ok(VoteTally {
            continuation_id,
            count: votes.len(),
            votes,
        })
    }

    /// Remove the caller's vote. Returns how many votes were removed; 0 when
    /// the caller had not voted.
    pub async fn withdraw(
        &self,
        continuation_id: ContinuationId,
        voter: &Identity,
    ) -> Result<u64, VoteError> {
        let removed = self.votes.delete_vote(&continuation_id, voter).await?;
        debug!(%continuation_id, voter = %voter, removed, "vote withdrawn");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rysto_storage::memory::InMemoryRystoStorage;
    use rysto_types::SystemClock;

    fn service() -> VoteService {
        VoteService::new(
            Arc::new(InMemoryRystoStorage::new()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn one_vote_per_reader() {
        let svc = service();
        let cid = ContinuationId::generate();
        let reader = Identity::new("r@a.io");

        svc.cast(cid, &reader).await.unwrap();
        assert!(matches!(
            svc.cast(cid, &reader).await,
            Err(VoteError::AlreadyVoted)
        ));
        svc.cast(cid, &Identity::new("s@a.io")).await.unwrap();

        let tally = svc.votes_for(cid).await.unwrap();
        assert_eq!(tally.count, 2);
        assert_eq!(tally.votes.len(), 2);
    }

    #[tokio::test]
    async fn withdraw_is_idempotent() {
        let svc = service();
        let cid = ContinuationId::generate();
        let reader = Identity::new("r@a.io");

        svc.cast(cid, &reader).await.unwrap();
        assert_eq!(svc.withdraw(cid, &reader).await.unwrap(), 1);
        assert_eq!(svc.withdraw(cid, &reader).await.unwrap(), 0);
        assert_eq!(svc.votes_for(cid).await.unwrap().count, 0);

        svc.cast(cid, &reader).await.unwrap();
        assert_eq!(svc.votes_for(cid).await.unwrap().count, 1);
    }

    #[test]
    fn tally_serializes_camel_case() {
        let tally = VoteTally {
            continuation_id: ContinuationId::generate(),
            count: 0,
            votes: vec![],
        };
        let json = serde_json::to_value(&tally).unwrap();
        assert!(json.get("continuationId").is_some());
        assert_eq!(json["count"], 0);
    }
}
