use thiserror::Error;

use rostrum_crypto::{PasswordError, TokenError};
use rostrum_db::DbError;
use rostrum_types::models::FederatedProvider;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed or missing input. The message is shown to the caller.
    #[error("{0}")]
    Validation(String),

    /// Unknown email or wrong password; deliberately does not say which.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid {0} token")]
    InvalidProviderToken(FederatedProvider),

    #[error("{0}")]
    Conflict(String),

    #[error("user not found")]
    NotFound,

    /// Constraint conflicts kept recurring past the retry budget.
    #[error("identity resolution kept colliding with concurrent requests")]
    Transient,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
