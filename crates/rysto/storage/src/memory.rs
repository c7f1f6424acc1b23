//! In-memory reference implementation for Rysto storage traits.
//!
//! This adapter is deterministic and test-friendly: every filtered write runs
//! inside one write-lock critical section, which gives it the same
//! per-document atomicity as the PostgreSQL adapter. Session expiry follows
//! the injected [`Clock`]. Production deployments with more than one service
//! process must use a shared backend.

use crate::model::{ContinuationFilter, ContinuationPatch, StoryFilter, StoryPatch, WriteOutcome};
use crate::traits::{ContinuationStore, CredentialStore, SessionCache, StoryStore, VoteStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rysto_types::{
    Clock, Continuation, ContinuationId, Credential, CredentialId, Identity, Story, StoryId,
    SystemClock, Vote, VoteId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct SessionEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory Rysto storage adapter.
pub struct InMemoryRystoStorage {
    credentials: RwLock<HashMap<Identity, Credential>>,
    stories: RwLock<HashMap<StoryId, Story>>,
    continuations: RwLock<HashMap<ContinuationId, Continuation>>,
    votes: RwLock<Vec<Vote>>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRystoStorage {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            stories: RwLock::new(HashMap::new()),
            continuations: RwLock::new(HashMap::new()),
            votes: RwLock::new(Vec::new()),
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryRystoStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryRystoStorage {
    async fn find_credential(&self, email: &Identity) -> StorageResult<Option<Credential>> {
        let guard = self
            .credentials
            .read()
            .map_err(|_| StorageError::Backend("credentials lock poisoned".to_string()))?;
        Ok(guard.get(email).cloned())
    }

    async fn count_credentials(&self, email: &Identity) -> StorageResult<u64> {
        let guard = self
            .credentials
            .read()
            .map_err(|_| StorageError::Backend("credentials lock poisoned".to_string()))?;
        Ok(u64::from(guard.contains_key(email)))
    }

    async fn insert_credential(&self, credential: Credential) -> StorageResult<CredentialId> {
        let mut guard = self
            .credentials
            .write()
            .map_err(|_| StorageError::Backend("credentials lock poisoned".to_string()))?;

        if guard.contains_key(&credential.email) {
            return Err(StorageError::Conflict(format!(
                "identity {} already registered",
                credential.email
            )));
        }

        let id = credential.id;
        guard.insert(credential.email.clone(), credential);
        Ok(id)
    }
}

#[async_trait]
impl StoryStore for InMemoryRystoStorage {
    async fn insert_story(&self, story: Story) -> StorageResult<StoryId> {
        let mut guard = self
            .stories
            .write()
            .map_err(|_| StorageError::Backend("stories lock poisoned".to_string()))?;

        if guard.contains_key(&story.id) {
            return Err(StorageError::Conflict(format!(
                "story {} already exists",
                story.id
            )));
        }

        let id = story.id;
        guard.insert(id, story);
        Ok(id)
    }

    async fn get_story(&self, id: &StoryId) -> StorageResult<Option<Story>> {
        let guard = self
            .stories
            .read()
            .map_err(|_| StorageError::Backend("stories lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn find_stories(&self, filter: &StoryFilter) -> StorageResult<Vec<Story>> {
        let guard = self
            .stories
            .read()
            .map_err(|_| StorageError::Backend("stories lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|story| filter.matches(story))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(values)
    }

    async fn update_story(
        &self,
        filter: &StoryFilter,
        patch: StoryPatch,
    ) -> StorageResult<WriteOutcome> {
        let id = filter.id.ok_or_else(|| {
            StorageError::InvalidInput("story update filter must name an id".to_string())
        })?;
        let mut guard = self
            .stories
            .write()
            .map_err(|_| StorageError::Backend("stories lock poisoned".to_string()))?;

        match guard.get_mut(&id) {
            Some(story) if filter.matches(story) => {
                patch.apply(story);
                Ok(WriteOutcome::Updated)
            }
            _ => Ok(WriteOutcome::NoMatch),
        }
    }

    async fn delete_story(&self, filter: &StoryFilter) -> StorageResult<u64> {
        let id = filter.id.ok_or_else(|| {
            StorageError::InvalidInput("story delete filter must name an id".to_string())
        })?;
        let mut guard = self
            .stories
            .write()
            .map_err(|_| StorageError::Backend("stories lock poisoned".to_string()))?;

        let matched = guard.get(&id).map_or(false, |story| filter.matches(story));
        if matched {
            guard.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

#[async_trait]
impl ContinuationStore for InMemoryRystoStorage {
    async fn insert_continuation(
        &self,
        continuation: Continuation,
    ) -> StorageResult<ContinuationId> {
        let mut guard = self
            .continuations
            .write()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;

        if guard.contains_key(&continuation.id) {
            return Err(StorageError::Conflict(format!(
                "continuation {} already exists",
                continuation.id
            )));
        }

        let id = continuation.id;
        guard.insert(id, continuation);
        Ok(id)
    }

    async fn get_continuation(&self, id: &ContinuationId) -> StorageResult<Option<Continuation>> {
        let guard = self
            .continuations
            .read()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn find_continuations(
        &self,
        filter: &ContinuationFilter,
    ) -> StorageResult<Vec<Continuation>> {
        let guard = self
            .continuations
            .read()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|continuation| filter.matches(continuation))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(values)
    }

    async fn update_continuation(
        &self,
        filter: &ContinuationFilter,
        patch: ContinuationPatch,
    ) -> StorageResult<WriteOutcome> {
        let id = filter.id.ok_or_else(|| {
            StorageError::InvalidInput("continuation update filter must name an id".to_string())
        })?;
        let mut guard = self
            .continuations
            .write()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;

        match guard.get_mut(&id) {
            Some(continuation) if filter.matches(continuation) => {
                patch.apply(continuation);
                Ok(WriteOutcome::Updated)
            }
            _ => Ok(WriteOutcome::NoMatch),
        }
    }

    async fn delete_continuation(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        let id = filter.id.ok_or_else(|| {
            StorageError::InvalidInput("continuation delete filter must name an id".to_string())
        })?;
        let mut guard = self
            .continuations
            .write()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;

        let matched = guard
            .get(&id)
            .map_or(false, |continuation| filter.matches(continuation));
        if matched {
            guard.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_continuations(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        let mut guard = self
            .continuations
            .write()
            .map_err(|_| StorageError::Backend("continuations lock poisoned".to_string()))?;
        let before = guard.len();
        guard.retain(|_, continuation| !filter.matches(continuation));
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl VoteStore for InMemoryRystoStorage {
    async fn insert_vote(&self, vote: Vote) -> StorageResult<VoteId> {
        let mut guard = self
            .votes
            .write()
            .map_err(|_| StorageError::Backend("votes lock poisoned".to_string()))?;

        let duplicate = guard.iter().any(|existing| {
            existing.continuation_id == vote.continuation_id
                && existing.voter_email == vote.voter_email
        });
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "{} already voted for continuation {}",
                vote.voter_email, vote.continuation_id
            )));
        }

        let id = vote.id;
        guard.push(vote);
        Ok(id)
    }

    async fn find_votes(&self, continuation_id: &ContinuationId) -> StorageResult<Vec<Vote>> {
        let guard = self
            .votes
            .read()
            .map_err(|_| StorageError::Backend("votes lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|vote| &vote.continuation_id == continuation_id)
            .cloned()
            .collect())
    }

    async fn delete_vote(
        &self,
        continuation_id: &ContinuationId,
        voter: &Identity,
    ) -> StorageResult<u64> {
        let mut guard = self
            .votes
            .write()
            .map_err(|_| StorageError::Backend("votes lock poisoned".to_string()))?;
        let position = guard.iter().position(|vote| {
            &vote.continuation_id == continuation_id && &vote.voter_email == voter
        });
        match position {
            Some(index) => {
                guard.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl SessionCache for InMemoryRystoStorage {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        if ttl <= Duration::zero() {
            return Err(StorageError::InvalidInput(
                "session ttl must be positive".to_string(),
            ));
        }
        let now = self.clock.now();
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| StorageError::Backend("sessions lock poisoned".to_string()))?;
        guard.retain(|_, entry| entry.expires_at > now);
        guard.insert(
            key.to_string(),
            SessionEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = self.clock.now();
        let guard = self
            .sessions
            .read()
            .map_err(|_| StorageError::Backend("sessions lock poisoned".to_string()))?;
        Ok(guard
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| StorageError::Backend("sessions lock poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
