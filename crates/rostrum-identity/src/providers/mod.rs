//! Adapters that turn an opaque provider token into a verified identity.

pub mod apple;
pub mod google;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;

use rostrum_types::models::FederatedProvider;

pub use apple::AppleVerifier;
pub use google::GoogleVerifier;

/// What a provider vouches for after checking a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Stable account id at the provider (`sub`).
    pub subject: String,
    /// May be empty when the provider withholds it.
    pub email: String,
    pub email_verified: bool,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(reqwest::Error),

    #[error("provider rejected the token with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("unreadable provider response: {0}")]
    BadResponse(reqwest::Error),

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("signature check failed: {0}")]
    Signature(jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("token audience does not match this service")]
    AudienceMismatch,

    #[error("email address not verified by the provider")]
    EmailNotVerified,

    #[error("no signing key with id {0:?}")]
    UnknownKey(String),

    #[error("{0} sign-in is not configured")]
    NotConfigured(FederatedProvider),
}

/// Verifies a provider token. Implementations must not touch the store.
#[async_trait]
pub trait ProviderVerifier: Send + Sync {
    fn provider(&self) -> FederatedProvider;

    async fn verify(&self, token: &str) -> Result<ProviderIdentity, ProviderError>;
}

/// Shared HTTP client for provider calls. Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// Providers encode booleans either as JSON booleans or as `"true"` / `"false"`.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Bool(b)) => Ok(Some(b)),
        Some(Raw::Str(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(de::Error::custom(format!("expected a boolean, got {other:?}"))),
        },
    }
}
