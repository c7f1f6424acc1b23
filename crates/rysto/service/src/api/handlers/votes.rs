//! Voting handlers

use crate::deadline::within;
use crate::error::ApiResult;
use crate::state::VoteState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rysto_auth::Principal;
use rysto_types::{ContinuationId, Vote};
use rysto_voting::VoteTally;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct VoteRecordedResponse {
    pub message: String,
    pub vote: Vote,
}

#[derive(Debug, Serialize)]
pub struct VoteDeletedResponse {
    pub message: String,
    pub removed: u64,
}

fn continuation_id(raw: &str) -> ApiResult<ContinuationId> {
    Ok(raw.parse::<ContinuationId>()?)
}

pub async fn cast_vote(
    State(state): State<VoteState>,
    Extension(principal): Extension<Principal>,
    Path(cid): Path<String>,
) -> ApiResult<(StatusCode, Json<VoteRecordedResponse>)> {
    let cid = continuation_id(&cid)?;
    let vote = within(state.timeout, state.votes.cast(cid, &principal.identity)).await?;
    state.metrics.votes_cast_total.inc();
    state.metrics.active_votes.inc();
    Ok((
        StatusCode::CREATED,
        Json(VoteRecordedResponse {
            message: "Vote recorded".to_string(),
            vote,
        }),
    ))
}

pub async fn list_votes(
    State(state): State<VoteState>,
    Path(cid): Path<String>,
) -> ApiResult<Json<VoteTally>> {
    let cid = continuation_id(&cid)?;
    let tally = within(state.timeout, state.votes.votes_for(cid)).await?;
    Ok(Json(tally))
}

pub async fn withdraw_vote(
    State(state): State<VoteState>,
    Extension(principal): Extension<Principal>,
    Path(cid): Path<String>,
) -> ApiResult<Json<VoteDeletedResponse>> {
    let cid = continuation_id(&cid)?;
    let removed = within(state.timeout, state.votes.withdraw(cid, &principal.identity)).await?;
    state.metrics.votes_deleted_total.inc_by(removed);
    state.metrics.active_votes.sub(i64::try_from(removed).unwrap_or(i64::MAX));
    Ok(Json(VoteDeletedResponse {
        message: "Vote deleted".to_string(),
        removed,
    }))
}
