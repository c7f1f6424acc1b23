use crate::model::{ContinuationFilter, ContinuationPatch, StoryFilter, StoryPatch, WriteOutcome};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::Duration;
use rysto_types::{
    Continuation, ContinuationId, Credential, CredentialId, Identity, Story, StoryId, Vote, VoteId,
};

/// Storage interface for account credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, email: &Identity) -> StorageResult<Option<Credential>>;

    async fn count_credentials(&self, email: &Identity) -> StorageResult<u64>;

    /// Insert a credential. Fails with `StorageError::Conflict` when the
    /// identity is already registered.
    async fn insert_credential(&self, credential: Credential) -> StorageResult<CredentialId>;
}

/// Storage interface for stories.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn insert_story(&self, story: Story) -> StorageResult<StoryId>;

    async fn get_story(&self, id: &StoryId) -> StorageResult<Option<Story>>;

    /// All stories matching the filter, oldest first.
    async fn find_stories(&self, filter: &StoryFilter) -> StorageResult<Vec<Story>>;

    /// Apply `patch` to the story matching `filter`. The filter must name an id.
    async fn update_story(
        &self,
        filter: &StoryFilter,
        patch: StoryPatch,
    ) -> StorageResult<WriteOutcome>;

    /// Delete the story matching `filter`, returning the number removed (0 or 1).
    async fn delete_story(&self, filter: &StoryFilter) -> StorageResult<u64>;
}

/// Storage interface for continuations.
#[async_trait]
pub trait ContinuationStore: Send + Sync {
    async fn insert_continuation(&self, continuation: Continuation)
        -> StorageResult<ContinuationId>;

    async fn get_continuation(&self, id: &ContinuationId) -> StorageResult<Option<Continuation>>;

    /// All continuations matching the filter, oldest first.
    async fn find_continuations(
        &self,
        filter: &ContinuationFilter,
    ) -> StorageResult<Vec<Continuation>>;

    /// Apply `patch` to the continuation matching `filter`. The filter must name an id.
    async fn update_continuation(
        &self,
        filter: &ContinuationFilter,
        patch: ContinuationPatch,
    ) -> StorageResult<WriteOutcome>;

    /// Delete the continuation matching `filter` (0 or 1). The filter must name an id.
    async fn delete_continuation(&self, filter: &ContinuationFilter) -> StorageResult<u64>;

    /// Delete every continuation matching `filter`.
    async fn delete_continuations(&self, filter: &ContinuationFilter) -> StorageResult<u64>;
}

/// Storage interface for votes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Record a vote. Fails with `StorageError::Conflict` when the voter
    /// already voted for the continuation.
    async fn insert_vote(&self, vote: Vote) -> StorageResult<VoteId>;

    async fn find_votes(&self, continuation_id: &ContinuationId) -> StorageResult<Vec<Vote>>;

    async fn delete_vote(
        &self,
        continuation_id: &ContinuationId,
        voter: &Identity,
    ) -> StorageResult<u64>;
}

/// Key/value cache with per-entry expiry, used for session registrations.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()>;

    /// `None` once the entry expired or was deleted.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Stories plus their continuations.
pub trait ContentStore: StoryStore + ContinuationStore + Send + Sync {}

impl<T> ContentStore for T where T: StoryStore + ContinuationStore + Send + Sync {}

/// Unified storage bundle used by all Rysto services.
pub trait RystoStorage:
    CredentialStore + StoryStore + ContinuationStore + VoteStore + SessionCache + Send + Sync
{
}

impl<T> RystoStorage for T where
    T: CredentialStore + StoryStore + ContinuationStore + VoteStore + SessionCache + Send + Sync
{
}
