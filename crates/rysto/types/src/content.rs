use crate::{ContinuationId, Identity, StoryId, VoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A story opened by its author for others to continue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub author_id: Identity,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, when the author accepts a continuation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_continuation_id: Option<ContinuationId>,
}

/// Where a story stands with respect to its single acceptance slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptanceState {
    Open,
    Accepted(ContinuationId),
}

impl Story {
    pub fn new(
        author_id: Identity,
        title: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StoryId::generate(),
            author_id,
            title: title.into(),
            content: content.into(),
            tags,
            created_at,
            accepted_continuation_id: None,
        }
    }

    pub fn acceptance(&self) -> AcceptanceState {
        match self.accepted_continuation_id {
            Some(id) => AcceptanceState::Accepted(id),
            None => AcceptanceState::Open,
        }
    }
}

/// A continuation submitted to a story. Immutable once accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuation {
    pub id: ContinuationId,
    pub story_id: StoryId,
    pub author_id: Identity,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub accepted: bool,
}

impl Continuation {
    pub fn new(
        story_id: StoryId,
        author_id: Identity,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContinuationId::generate(),
            story_id,
            author_id,
            content: content.into(),
            created_at,
            accepted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub continuation_id: ContinuationId,
    pub voter_email: Identity,
    pub voted_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        continuation_id: ContinuationId,
        voter_email: Identity,
        voted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: VoteId::generate(),
            continuation_id,
            voter_email,
            voted_at,
        }
    }
}
