use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use axum_extra::typed_header::TypedHeaderRejection;

use rostrum_crypto::TokenError;

use crate::{ApiError, AppState};

/// Validate the bearer token and make its `Claims` available to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| ApiError::unauthorized("missing bearer token"))?;

    let claims = state
        .identity
        .tokens()
        .verify(bearer.token())
        .map_err(|e| match e {
            TokenError::Expired => ApiError::unauthorized("token expired"),
            _ => ApiError::unauthorized("invalid token"),
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
