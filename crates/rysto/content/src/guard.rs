//! Ownership rules for stories and continuations.
//!
//! The predicates and the scopes describe the same rule twice: once for a
//! document already in hand and once as a store filter, so that edits and
//! deletes can be issued as one filtered write.

use rysto_storage::{ContinuationFilter, StoryFilter};
use rysto_types::{Continuation, ContinuationId, Identity, Story, StoryId};

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipGuard;

impl OwnershipGuard {
    pub fn can_mutate_story(story: &Story, caller: &Identity) -> bool {
        &story.author_id == caller
    }

    /// Accepted continuations are locked, even for their author.
    pub fn can_mutate_continuation(continuation: &Continuation, caller: &Identity) -> bool {
        &continuation.author_id == caller && !continuation.accepted
    }

    pub fn can_accept(story: &Story, caller: &Identity) -> bool {
        &story.author_id == caller
    }

    pub fn story_scope(id: StoryId, caller: &Identity) -> StoryFilter {
        StoryFilter::by_id(id).authored_by(caller.clone())
    }

    pub fn continuation_scope(id: ContinuationId, caller: &Identity) -> ContinuationFilter {
        ContinuationFilter::by_id(id)
            .authored_by(caller.clone())
            .unaccepted()
    }
}
