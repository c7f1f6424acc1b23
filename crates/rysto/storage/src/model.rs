use rysto_types::{Continuation, ContinuationId, Identity, Story, StoryId};

/// Result of a single-document filtered write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated,
    NoMatch,
}

impl WriteOutcome {
    pub fn is_updated(self) -> bool {
        matches!(self, WriteOutcome::Updated)
    }
}

/// Constraint on a story's acceptance slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFilter {
    /// No continuation accepted yet.
    Open,
    /// The slot holds exactly this continuation.
    Holding(ContinuationId),
}

/// Conjunction of story field constraints. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryFilter {
    pub id: Option<StoryId>,
    pub author_id: Option<Identity>,
    pub title: Option<String>,
    pub slot: Option<SlotFilter>,
}

impl StoryFilter {
    pub fn by_id(id: StoryId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn authored_by(mut self, author: Identity) -> Self {
        self.author_id = Some(author);
        self
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn open(mut self) -> Self {
        self.slot = Some(SlotFilter::Open);
        self
    }

    pub fn holding(mut self, continuation_id: ContinuationId) -> Self {
        self.slot = Some(SlotFilter::Holding(continuation_id));
        self
    }

    pub fn matches(&self, story: &Story) -> bool {
        self.id.map_or(true, |id| story.id == id)
            && self
                .author_id
                .as_ref()
                .map_or(true, |author| &story.author_id == author)
            && self
                .title
                .as_ref()
                .map_or(true, |title| &story.title == title)
            && self.slot.map_or(true, |slot| match slot {
                SlotFilter::Open => story.accepted_continuation_id.is_none(),
                SlotFilter::Holding(id) => story.accepted_continuation_id == Some(id),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryPatch {
    Content(String),
    Accept(ContinuationId),
    /// Clear the acceptance slot. Only used to compensate a failed acceptance.
    ReleaseAcceptance,
}

impl StoryPatch {
    pub fn apply(&self, story: &mut Story) {
        match self {
            StoryPatch::Content(content) => story.content = content.clone(),
            StoryPatch::Accept(id) => story.accepted_continuation_id = Some(*id),
            StoryPatch::ReleaseAcceptance => story.accepted_continuation_id = None,
        }
    }
}

/// Conjunction of continuation field constraints. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinuationFilter {
    pub id: Option<ContinuationId>,
    pub story_id: Option<StoryId>,
    pub author_id: Option<Identity>,
    pub unaccepted_only: bool,
}

impl ContinuationFilter {
    pub fn by_id(id: ContinuationId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn of_story(story_id: StoryId) -> Self {
        Self {
            story_id: Some(story_id),
            ..Self::default()
        }
    }

    pub fn in_story(mut self, story_id: StoryId) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn authored_by(mut self, author: Identity) -> Self {
        self.author_id = Some(author);
        self
    }

    pub fn unaccepted(mut self) -> Self {
        self.unaccepted_only = true;
        self
    }

    pub fn matches(&self, continuation: &Continuation) -> bool {
        self.id.map_or(true, |id| continuation.id == id)
            && self
                .story_id
                .map_or(true, |story_id| continuation.story_id == story_id)
            && self
                .author_id
                .as_ref()
                .map_or(true, |author| &continuation.author_id == author)
            && (!self.unaccepted_only || !continuation.accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuationPatch {
    Content(String),
    MarkAccepted,
}

impl ContinuationPatch {
    pub fn apply(&self, continuation: &mut Continuation) {
        match self {
            ContinuationPatch::Content(content) => continuation.content = content.clone(),
            ContinuationPatch::MarkAccepted => continuation.accepted = true,
        }
    }
}
