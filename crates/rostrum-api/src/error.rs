use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use rostrum_db::LedgerError;
use rostrum_identity::IdentityError;
use rostrum_types::api::ErrorResponse;

/// An error rendered as `{"error": "..."}` with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn retry_later() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "please retry")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation(msg) | IdentityError::Conflict(msg) => Self::bad_request(msg),
            IdentityError::InvalidCredentials | IdentityError::InvalidProviderToken(_) => {
                Self::unauthorized(err.to_string())
            }
            IdentityError::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            IdentityError::Transient => {
                warn!("{}", err);
                Self::retry_later()
            }
            IdentityError::Db(_)
            | IdentityError::Password(_)
            | IdentityError::Token(_)
            | IdentityError::Join(_) => {
                error!("Identity request failed: {}", err);
                Self::internal()
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::TargetNotFound(_) | LedgerError::VoterNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            LedgerError::Contention(_) => {
                warn!("{}", err);
                Self::retry_later()
            }
            LedgerError::Db(e) => {
                error!("Vote ledger failed: {}", e);
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path: {}", rejection.body_text());
        Self::bad_request("invalid id")
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("spawn_blocking join error: {}", err);
        Self::internal()
    }
}
