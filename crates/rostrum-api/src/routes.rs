use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::{AppState, auth, votes};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/auth/google", post(auth::google))
        .route("/api/auth/apple", post(auth::apple))
        .route("/api/posts/{id}/votes", get(votes::post_votes))
        .route("/api/comments/{id}/votes", get(votes::comment_votes));

    let protected_routes = Router::new()
        .route("/api/me", get(auth::me))
        .route("/api/posts/{id}/vote", post(votes::vote_post))
        .route("/api/comments/{id}/upvote", post(votes::upvote_comment))
        .route("/api/comments/{id}/downvote", post(votes::downvote_comment))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
