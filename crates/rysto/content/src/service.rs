use crate::acceptance::{AcceptanceOutcome, AcceptanceWorkflow};
use crate::error::{ContentError, ContentResult};
use crate::guard::OwnershipGuard;
use rysto_storage::{ContentStore, ContinuationFilter, ContinuationPatch, StoryFilter, StoryPatch};
use rysto_types::{Clock, Continuation, ContinuationId, Identity, Story, StoryId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

const STORY_FORBIDDEN: &str = "Unauthorized or story not found";
const CONTINUATION_FORBIDDEN: &str = "Unauthorized or continuation locked";

/// A story together with every continuation submitted to it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoryThread {
    pub story: Story,
    pub continuations: Vec<Continuation>,
}

/// Optional listing constraints. A present but blank value is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryQuery {
    pub title: Option<String>,
    pub author_id: Option<String>,
}

/// Story and continuation operations, with ownership enforced through
/// filtered writes.
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn ContentStore>,
    acceptance: AcceptanceWorkflow,
    clock: Arc<dyn Clock>,
}

impl ContentService {
    pub fn new(store: Arc<dyn ContentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            acceptance: AcceptanceWorkflow::new(store.clone()),
            store,
            clock,
        }
    }

    pub async fn create_story(
        &self,
        author: &Identity,
        title: &str,
        content: &str,
        tags: Vec<String>,
    ) -> ContentResult<Story> {
        let title = required("title", title)?;
        let content = required("content", content)?;

        let story = Story::new(author.clone(), title, content, tags, self.clock.now());
        self.store.insert_story(story.clone()).await?;
        info!(story_id = %story.id, author = %author, "story created");
        Ok(story)
    }

    pub async fn add_continuation(
        &self,
        story_id: StoryId,
        author: &Identity,
        content: &str,
    ) -> ContentResult<Continuation> {
        let content = required("content", content)?;
        if self.store.get_story(&story_id).await?.is_none() {
            return Err(ContentError::NotFound("Story not found".to_string()));
        }

        let continuation = Continuation::new(story_id, author.clone(), content, self.clock.now());
        self.store.insert_continuation(continuation.clone()).await?;
        info!(%story_id, continuation_id = %continuation.id, author = %author, "continuation submitted");
        Ok(continuation)
    }

    pub async fn edit_story(
        &self,
        story_id: StoryId,
        caller: &Identity,
        content: &str,
    ) -> ContentResult<()> {
        let content = required("content", content)?;
        let outcome = self
            .store
            .update_story(
                &OwnershipGuard::story_scope(story_id, caller),
                StoryPatch::Content(content.to_string()),
            )
            .await?;
        if !outcome.is_updated() {
            return Err(ContentError::Forbidden(STORY_FORBIDDEN.to_string()));
        }
        debug!(%story_id, "story edited");
        Ok(())
    }

    pub async fn edit_continuation(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
        caller: &Identity,
        content: &str,
    ) -> ContentResult<()> {
        let content = required("content", content)?;
        let outcome = self
            .store
            .update_continuation(
                &OwnershipGuard::continuation_scope(continuation_id, caller).in_story(story_id),
                ContinuationPatch::Content(content.to_string()),
            )
            .await?;
        if !outcome.is_updated() {
            return Err(ContentError::Forbidden(CONTINUATION_FORBIDDEN.to_string()));
        }
        debug!(%story_id, %continuation_id, "continuation edited");
        Ok(())
    }

    /// Delete a story, then its continuations. A failed cascade is logged and
    /// does not fail the call; orphans may remain.
    pub async fn delete_story(&self, story_id: StoryId, caller: &Identity) -> ContentResult<()> {
        let removed = self
            .store
            .delete_story(&OwnershipGuard::story_scope(story_id, caller))
            .await?;
        if removed == 0 {
            return Err(ContentError::Forbidden(STORY_FORBIDDEN.to_string()));
        }

        match self
            .store
            .delete_continuations(&ContinuationFilter::of_story(story_id))
            .await
        {
            Ok(count) => info!(%story_id, continuations = count, "story deleted"),
            Err(err) => error!(%story_id, error = %err, "story deleted but continuation cascade failed"),
        }
        Ok(())
    }

    pub async fn delete_continuation(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
        caller: &Identity,
    ) -> ContentResult<()> {
        let removed = self
            .store
            .delete_continuation(
                &OwnershipGuard::continuation_scope(continuation_id, caller).in_story(story_id),
            )
            .await?;
        if removed == 0 {
            return Err(ContentError::Forbidden(CONTINUATION_FORBIDDEN.to_string()));
        }
        debug!(%story_id, %continuation_id, "continuation deleted");
        Ok(())
    }

    pub async fn accept(
        &self,
        story_id: StoryId,
        continuation_id: ContinuationId,
        caller: &Identity,
    ) -> ContentResult<AcceptanceOutcome> {
        self.acceptance
            .accept(story_id, continuation_id, caller)
            .await
    }

    pub async fn story_with_continuations(&self, story_id: StoryId) -> ContentResult<StoryThread> {
        let story = self
            .store
            .get_story(&story_id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Story not found".to_string()))?;
        self.thread(story).await
    }

    pub async fn list_stories(&self, query: &StoryQuery) -> ContentResult<Vec<StoryThread>> {
        let mut filter = StoryFilter::default();
        if let Some(title) = &query.title {
            filter = filter.titled(required("title", title)?);
        }
        if let Some(author) = &query.author_id {
            filter = filter.authored_by(Identity::new(required("authorId", author)?));
        }

        let stories = self.store.find_stories(&filter).await?;
        let mut threads = Vec::with_capacity(stories.len());
        for story in stories {
            threads.push(self.thread(story).await?);
        }
        Ok(threads)
    }

    async fn thread(&self, story: Story) -> ContentResult<StoryThread> {
        let continuations = self
            .store
            .find_continuations(&ContinuationFilter::of_story(story.id))
            .await?;
        Ok(StoryThread {
            story,
            continuations,
        })
    }
}

fn required<'a>(field: &str, value: &'a str) -> ContentResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContentError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rysto_storage::memory::InMemoryRystoStorage;
    use rysto_storage::{ContinuationStore, StoryStore};
    use rysto_types::SystemClock;

    fn service() -> (ContentService, Arc<InMemoryRystoStorage>) {
        let store = Arc::new(InMemoryRystoStorage::new());
        (
            ContentService::new(store.clone(), Arc::new(SystemClock)),
            store,
        )
    }

    fn x() -> Identity {
        Identity::new("x@a.io")
    }

    fn y() -> Identity {
        Identity::new("y@a.io")
    }

    #[tokio::test]
    async fn blank_fields_are_validation_errors() {
        let (svc, _) = service();
        assert!(matches!(
            svc.create_story(&x(), "  ", "body", vec![]).await,
            Err(ContentError::Validation(_))
        ));
        assert!(matches!(
            svc.create_story(&x(), "Title", "", vec![]).await,
            Err(ContentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn continuation_on_missing_story_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.add_continuation(StoryId::generate(), &y(), "more").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_the_author_edits_and_deletes_a_story() {
        let (svc, store) = service();
        let story = svc.create_story(&x(), "Title", "Once", vec![]).await.unwrap();

        assert!(matches!(
            svc.edit_story(story.id, &y(), "Hijacked").await,
            Err(ContentError::Forbidden(_))
        ));
        assert!(matches!(
            svc.delete_story(story.id, &y()).await,
            Err(ContentError::Forbidden(_))
        ));
        assert!(matches!(
            svc.edit_story(StoryId::generate(), &x(), "Nope").await,
            Err(ContentError::Forbidden(_))
        ));

        svc.edit_story(story.id, &x(), "Once upon").await.unwrap();
        assert_eq!(
            store.get_story(&story.id).await.unwrap().unwrap().content,
            "Once upon"
        );
    }

    #[tokio::test]
    async fn accepted_continuation_is_locked_for_its_author() {
        let (svc, _) = service();
        let story = svc.create_story(&x(), "Title", "Once", vec![]).await.unwrap();
        let cont = svc.add_continuation(story.id, &y(), "then").await.unwrap();

        svc.edit_continuation(story.id, cont.id, &y(), "then, later")
            .await
            .unwrap();
        svc.accept(story.id, cont.id, &x()).await.unwrap();

        assert!(matches!(
            svc.edit_continuation(story.id, cont.id, &y(), "rewrite").await,
            Err(ContentError::Forbidden(_))
        ));
        assert!(matches!(
            svc.delete_continuation(story.id, cont.id, &y()).await,
            Err(ContentError::Forbidden(_))
        ));

        let thread = svc.story_with_continuations(story.id).await.unwrap();
        assert_eq!(thread.story.accepted_continuation_id, Some(cont.id));
        assert_eq!(thread.continuations[0].content, "then, later");
        assert!(thread.continuations[0].accepted);
    }

    #[tokio::test]
    async fn deleting_a_story_cascades() {
        let (svc, store) = service();
        let story = svc.create_story(&x(), "Title", "Once", vec![]).await.unwrap();
        svc.add_continuation(story.id, &y(), "a").await.unwrap();
        svc.add_continuation(story.id, &y(), "b").await.unwrap();

        svc.delete_story(story.id, &x()).await.unwrap();

        assert!(store.get_story(&story.id).await.unwrap().is_none());
        assert!(store
            .find_continuations(&ContinuationFilter::of_story(story.id))
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            svc.story_with_continuations(story.id).await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_filters_by_title_and_author() {
        let (svc, _) = service();
        svc.create_story(&x(), "Dawn", "a", vec![]).await.unwrap();
        svc.create_story(&y(), "Dawn", "b", vec![]).await.unwrap();
        svc.create_story(&y(), "Dusk", "c", vec![]).await.unwrap();

        let all = svc.list_stories(&StoryQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let dawn = svc
            .list_stories(&StoryQuery {
                title: Some("Dawn".to_string()),
                author_id: None,
            })
            .await
            .unwrap();
        assert_eq!(dawn.len(), 2);

        let by_y = svc
            .list_stories(&StoryQuery {
                title: Some("Dawn".to_string()),
                author_id: Some("y@a.io".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(by_y.len(), 1);
        assert_eq!(by_y[0].story.content, "b");

        assert!(matches!(
            svc.list_stories(&StoryQuery {
                title: Some(String::new()),
                author_id: None,
            })
            .await,
            Err(ContentError::Validation(_))
        ));
    }
}
