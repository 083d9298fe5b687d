use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::{
    Extension, Json,
    extract::{Path, State},
};

use rostrum_types::api::{Claims, VoteRequest, VoteResponse};
use rostrum_types::models::{CommentId, PostId, UserId, VoteDirection, VoteTally, VoteTarget};

use crate::{ApiError, AppState};

pub async fn vote_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let direction =
        VoteDirection::try_from(req.vote_type).map_err(|e| ApiError::bad_request(e.to_string()))?;
    cast(state, claims.user_id, VoteTarget::Post(PostId(id)), direction).await
}

pub async fn upvote_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Path(id) = path?;
    let target = VoteTarget::Comment(CommentId(id));
    cast(state, claims.user_id, target, VoteDirection::Up).await
}

pub async fn downvote_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Path(id) = path?;
    let target = VoteTarget::Comment(CommentId(id));
    cast(state, claims.user_id, target, VoteDirection::Down).await
}

pub async fn post_votes(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<VoteTally>, ApiError> {
    let Path(id) = path?;
    tally(state, VoteTarget::Post(PostId(id))).await
}

pub async fn comment_votes(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<VoteTally>, ApiError> {
    let Path(id) = path?;
    tally(state, VoteTarget::Comment(CommentId(id))).await
}

async fn cast(
    state: AppState,
    voter: UserId,
    target: VoteTarget,
    direction: VoteDirection,
) -> Result<Json<VoteResponse>, ApiError> {
    let outcome =
        tokio::task::spawn_blocking(move || state.db.cast_vote(voter, target, direction))
            .await??;
    Ok(Json(VoteResponse {
        message: outcome.message().to_string(),
    }))
}

async fn tally(state: AppState, target: VoteTarget) -> Result<Json<VoteTally>, ApiError> {
    let tally = tokio::task::spawn_blocking(move || state.db.tally(target)).await??;
    Ok(Json(tally))
}
