use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use rostrum_types::api::{Claims, SessionIdentity};

/// Sessions last three days; there is no refresh flow.
pub const SESSION_TTL_HOURS: i64 = 72;

/// Tokens are accepted up to this many seconds past `exp` to absorb clock drift
/// between hosts.
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret is empty")]
    MissingSecret,

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Mints and checks HS256 session tokens. The secret is injected once at startup.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(SESSION_TTL_HOURS),
        })
    }

    /// Override the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, identity: &SessionIdentity) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected session token: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid(e),
                }
            })
    }
}
