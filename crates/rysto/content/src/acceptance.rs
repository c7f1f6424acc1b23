//! Accepting a continuation into its story.
//!
//! A story has a single acceptance slot. Claiming it is a conditional write
//! on `(id, author, slot open)`, so of two concurrent accepts exactly one
//! wins. The continuation is flagged afterwards; if that second write fails
//! the slot is released again with a write conditional on still holding this
//! continuation.

use crate::error::{ContentError, ContentResult};
use crate::guard::OwnershipGuard;
use rysto_storage::{
    ContentStore, ContinuationFilter, ContinuationPatch, StorageError, StoryFilter, StoryPatch,
};
use rysto_types::{AcceptanceState, ContinuationId, Identity, StoryId};
use std::sync::Arc;
use tracing::{error, info, warn};

const CANNOT_ACCEPT: &str = "You cannot accept for this story";
const NOT_IN_STORY: &str = "Continuation does not belong to this story";
const SLOT_TAKEN: &str = "Story already has an accepted continuation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceOutcome {
    Accepted,
    /// This continuation was already the accepted one. Nothing changed.
    AlreadyAccepted,
}

#[derive(Clone)]
pub struct AcceptanceWorkflow {
    store: Arc<dyn ContentStore>,
}

impl AcceptanceWorkflow {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Accept `continuation_id` into `story_id` on behalf of `caller`.
    ///
    /// The claim and flag writes run on a detached task. Once the slot is
    /// claimed, the flag write or its release always completes, even when
    /// the caller stops waiting.
    pub async fn accept(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
        caller: &Identity,
    ) -> ContentResult<AcceptanceOutcome> {
        let workflow = self.clone();
        let caller = caller.clone();
        let task = tokio::spawn(async move {
            workflow
                .claim_and_flag(story_id, continuation_id, &caller)
                .await
        });

        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(%story_id, %continuation_id, error = %err, "acceptance task aborted");
                Err(ContentError::Storage(StorageError::Backend(format!(
                    "acceptance task aborted: {err}"
                ))))
            }
        }
    }

    async fn claim_and_flag(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
        caller: &Identity,
    ) -> ContentResult<AcceptanceOutcome> {
        let story = self
            .store
            .get_story(&story_id)
            .await?
            .filter(|story| OwnershipGuard::can_accept(story, caller))
            .ok_or_else(|| ContentError::Forbidden(CANNOT_ACCEPT.to_string()))?;

        self.store
            .get_continuation(&continuation_id)
            .await?
            .filter(|continuation| continuation.story_id == story_id)
            .ok_or_else(|| ContentError::Forbidden(NOT_IN_STORY.to_string()))?;

        match story.acceptance() {
            AcceptanceState::Accepted(current) if current == continuation_id => {
                return self.confirm_flag(story_id, continuation_id).await;
            }
            AcceptanceState::Accepted(_) => {
                return Err(ContentError::Conflict(SLOT_TAKEN.to_string()));
            }
            AcceptanceState::Open => {}
        }

        let claimed = self
            .store
            .update_story(
                &OwnershipGuard::story_scope(story_id, caller).open(),
                StoryPatch::Accept(continuation_id),
            )
            .await?;

        if !claimed.is_updated() {
            // Someone else touched the slot between the read and the write.
            let current = self
                .store
                .get_story(&story_id)
                .await?
                .filter(|story| OwnershipGuard::can_accept(story, caller))
                .ok_or_else(|| ContentError::Forbidden(CANNOT_ACCEPT.to_string()))?;
            return match current.acceptance() {
                AcceptanceState::Accepted(id) if id == continuation_id => {
                    self.confirm_flag(story_id, continuation_id).await
                }
                _ => Err(ContentError::Conflict(SLOT_TAKEN.to_string())),
            };
        }

        let marked = self
            .store
            .update_continuation(
                &ContinuationFilter::by_id(continuation_id).in_story(story_id),
                ContinuationPatch::MarkAccepted,
            )
            .await;

        match marked {
            Ok(outcome) if outcome.is_updated() => {
                info!(%story_id, %continuation_id, "continuation accepted");
                Ok(AcceptanceOutcome::Accepted)
            }
            Ok(_) => {
                error!(%story_id, %continuation_id, "continuation vanished during acceptance");
                Err(self.release(story_id, continuation_id).await)
            }
            Err(err) => {
                error!(%story_id, %continuation_id, error = %err, "failed to mark continuation accepted");
                Err(self.release(story_id, continuation_id).await)
            }
        }
    }

    /// Re-apply the continuation flag for an already accepted continuation.
    async fn confirm_flag(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
    ) -> ContentResult<AcceptanceOutcome> {
        let outcome = self
            .store
            .update_continuation(
                &ContinuationFilter::by_id(continuation_id).in_story(story_id),
                ContinuationPatch::MarkAccepted,
            )
            .await?;
        if !outcome.is_updated() {
            warn!(%story_id, %continuation_id, "accepted continuation no longer exists");
        }
        Ok(AcceptanceOutcome::AlreadyAccepted)
    }

    async fn release(&self, story_id: StoryId, continuation_id: ContinuationId) -> ContentError {
        let released = self
            .store
            .update_story(
                &StoryFilter::by_id(story_id).holding(continuation_id),
                StoryPatch::ReleaseAcceptance,
            )
            .await;
        let rolled_back = match released {
            Ok(outcome) => outcome.is_updated(),
            Err(err) => {
                error!(%story_id, %continuation_id, error = %err, "failed to release acceptance slot");
                false
            }
        };
        if rolled_back {
            warn!(%story_id, %continuation_id, "acceptance rolled back");
        }
        ContentError::PartialAcceptance { rolled_back }
    }
}
