//! Story and continuation handlers

use super::accounts::MessageResponse;
use crate::deadline::within;
use crate::error::{ApiError, ApiResult};
use crate::state::StoryState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use rysto_auth::Principal;
use rysto_content::{AcceptanceOutcome, StoryQuery, StoryThread};
use rysto_types::{Continuation, ContinuationId, Story, StoryId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body for story edits and for submitting or editing a continuation.
#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStoriesParams {
    pub title: Option<String>,
    pub author_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub message: String,
    pub story_id: StoryId,
    pub continuation_id: ContinuationId,
    pub already_accepted: bool,
}

fn story_id(raw: &str) -> ApiResult<StoryId> {
    Ok(raw.parse::<StoryId>()?)
}

fn continuation_id(raw: &str) -> ApiResult<ContinuationId> {
    Ok(raw.parse::<ContinuationId>()?)
}

pub async fn create_story(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<CreateStoryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Story>)> {
    let Json(request) = body?;
    let story = within(
        state.timeout,
        state.content.create_story(
            &principal.identity,
            &request.title,
            &request.content,
            request.tags,
        ),
    )
    .await?;
    state.metrics.stories_created_total.inc();
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn list_stories(
    State(state): State<StoryState>,
    params: Result<Query<ListStoriesParams>, QueryRejection>,
) -> ApiResult<Json<Vec<StoryThread>>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = StoryQuery {
        title: params.title,
        author_id: params.author_id,
    };
    let threads = within(state.timeout, state.content.list_stories(&query)).await?;
    Ok(Json(threads))
}

pub async fn get_story(
    State(state): State<StoryState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoryThread>> {
    let id = story_id(&id)?;
    let thread = within(state.timeout, state.content.story_with_continuations(id)).await?;
    Ok(Json(thread))
}

pub async fn edit_story(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let id = story_id(&id)?;
    let Json(request) = body?;
    within(
        state.timeout,
        state
            .content
            .edit_story(id, &principal.identity, &request.content),
    )
    .await?;
    Ok(Json(MessageResponse::new("Story updated")))
}

pub async fn delete_story(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = story_id(&id)?;
    within(
        state.timeout,
        state.content.delete_story(id, &principal.identity),
    )
    .await?;
    Ok(Json(MessageResponse::new("Story and its continuations deleted")))
}

pub async fn add_continuation(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Continuation>)> {
    let id = story_id(&id)?;
    let Json(request) = body?;
    let continuation = within(
        state.timeout,
        state
            .content
            .add_continuation(id, &principal.identity, &request.content),
    )
    .await?;
    state.metrics.continuations_added_total.inc();
    Ok((StatusCode::CREATED, Json(continuation)))
}

pub async fn edit_continuation(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path((id, cid)): Path<(String, String)>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let id = story_id(&id)?;
    let cid = continuation_id(&cid)?;
    let Json(request) = body?;
    within(
        state.timeout,
        state
            .content
            .edit_continuation(id, cid, &principal.identity, &request.content),
    )
    .await?;
    Ok(Json(MessageResponse::new("Continuation updated")))
}

pub async fn delete_continuation(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path((id, cid)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let id = story_id(&id)?;
    let cid = continuation_id(&cid)?;
    within(
        state.timeout,
        state
            .content
            .delete_continuation(id, cid, &principal.identity),
    )
    .await?;
    Ok(Json(MessageResponse::new("Continuation deleted")))
}

pub async fn accept_continuation(
    State(state): State<StoryState>,
    Extension(principal): Extension<Principal>,
    Path((id, cid)): Path<(String, String)>,
) -> ApiResult<Json<AcceptResponse>> {
    let id = story_id(&id)?;
    let cid = continuation_id(&cid)?;
    let outcome = within(
        state.timeout,
        state.content.accept(id, cid, &principal.identity),
    )
    .await?;
    if outcome == AcceptanceOutcome::Accepted {
        state.metrics.continuations_accepted_total.inc();
    }

    Ok(Json(AcceptResponse {
        message: "Continuation accepted".to_string(),
        story_id: id,
        continuation_id: cid,
        already_accepted: outcome == AcceptanceOutcome::AlreadyAccepted,
    }))
}
