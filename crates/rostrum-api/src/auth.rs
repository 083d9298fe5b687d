use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use rostrum_db::Database;
use rostrum_identity::{AuthSession, IdentityResolver};
use rostrum_types::api::{AuthResponse, Claims, LoginRequest, OAuthRequest, RegisterRequest};
use rostrum_types::models::{FederatedProvider, User};

use crate::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub identity: IdentityResolver,
}

fn auth_response(session: AuthSession, message: Option<&'static str>) -> Json<AuthResponse> {
    Json(AuthResponse {
        message,
        token: session.token,
        user: session.user,
    })
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let session = state.identity.register(req).await?;
    Ok((
        StatusCode::CREATED,
        auth_response(session, Some("User registered successfully")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let session = state.identity.login(req).await?;
    Ok(auth_response(session, Some("Login successful")))
}

pub async fn google(
    State(state): State<AppState>,
    payload: Result<Json<OAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    oauth(state, FederatedProvider::Google, payload).await
}

pub async fn apple(
    State(state): State<AppState>,
    payload: Result<Json<OAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    oauth(state, FederatedProvider::Apple, payload).await
}

async fn oauth(
    state: AppState,
    provider: FederatedProvider,
    payload: Result<Json<OAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let session = state.identity.oauth_login(provider, req).await?;
    Ok(auth_response(session, None))
}

/// The caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = state.identity.current_user(claims.user_id).await?;
    Ok(Json(user))
}
