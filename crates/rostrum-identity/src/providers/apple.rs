use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use rostrum_types::models::FederatedProvider;

use super::{ProviderError, ProviderIdentity, ProviderVerifier, flexible_bool};

pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Apple rotates keys rarely; an unknown `kid` forces a refetch regardless.
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Unknown `kid`s refetch at most this often while the cached set is fresh.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Verifies Sign in with Apple identity tokens (RS256) against Apple's published keys.
pub struct AppleVerifier {
    client: reqwest::Client,
    keys_url: String,
    /// Accepted `aud` values: the app's bundle id and/or services id.
    audiences: Vec<String>,
    keys: RwLock<Option<CachedKeys>>,
    min_refetch_interval: Duration,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct AppleIdClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    email_verified: Option<bool>,
    #[serde(default, deserialize_with = "flexible_bool")]
    is_private_email: Option<bool>,
}

impl AppleVerifier {
    pub fn new(client: reqwest::Client, audiences: Vec<String>) -> Self {
        Self {
            client,
            keys_url: APPLE_KEYS_URL.to_string(),
            audiences,
            keys: RwLock::new(None),
            min_refetch_interval: MIN_REFETCH_INTERVAL,
        }
    }

    pub fn with_keys_url(mut self, url: impl Into<String>) -> Self {
        self.keys_url = url.into();
        self
    }

    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    async fn signing_key(&self, kid: &str) -> Result<Jwk, ProviderError> {
        {
            let cached = self.keys.read().await;
            if let Some(keys) = cached.as_ref() {
                let age = keys.fetched_at.elapsed();
                if age < KEY_CACHE_TTL {
                    if let Some(jwk) = keys.set.find(kid) {
                        return Ok(jwk.clone());
                    }
                    if age < self.min_refetch_interval {
                        debug!("Unknown Apple key {}; keys fetched {:?} ago", kid, age);
                        return Err(ProviderError::UnknownKey(kid.to_string()));
                    }
                }
            }
        }

        let set = self.fetch_keys().await?;
        let found = set.find(kid).cloned();
        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });
        found.ok_or_else(|| ProviderError::UnknownKey(kid.to_string()))
    }

    async fn fetch_keys(&self) -> Result<JwkSet, ProviderError> {
        let response = self
            .client
            .get(&self.keys_url)
            .send()
            .await
            .map_err(ProviderError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected(status));
        }

        let set: JwkSet = response.json().await.map_err(ProviderError::BadResponse)?;
        info!("Fetched {} Apple signing keys", set.keys.len());
        Ok(set)
    }
}

#[async_trait]
impl ProviderVerifier for AppleVerifier {
    fn provider(&self) -> FederatedProvider {
        FederatedProvider::Apple
    }

    async fn verify(&self, token: &str) -> Result<ProviderIdentity, ProviderError> {
        if self.audiences.is_empty() {
            return Err(ProviderError::NotConfigured(FederatedProvider::Apple));
        }
        if token.split('.').count() != 3 {
            return Err(ProviderError::Malformed("expected three dot-separated segments"));
        }

        let header =
            decode_header(token).map_err(|_| ProviderError::Malformed("unreadable header"))?;
        if header.alg != Algorithm::RS256 {
            return Err(ProviderError::Malformed("unexpected signing algorithm"));
        }
        let kid = header
            .kid
            .ok_or(ProviderError::Malformed("missing key id"))?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(ProviderError::Signature)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[APPLE_ISSUER]);
        validation.set_audience(&self.audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<AppleIdClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ProviderError::Expired,
                ErrorKind::InvalidAudience => ProviderError::AudienceMismatch,
                _ => ProviderError::Signature(e),
            })?
            .claims;

        let email = claims.email.unwrap_or_default();
        // Apple omits the flag along with the email on repeat sign-ins.
        let email_verified = claims.email_verified.unwrap_or(false);
        if claims.email_verified == Some(false) || (!email.is_empty() && !email_verified) {
            return Err(ProviderError::EmailNotVerified);
        }
        if claims.is_private_email == Some(true) {
            debug!("Apple subject {} uses a private relay address", claims.sub);
        }

        Ok(ProviderIdentity {
            subject: claims.sub,
            email,
            email_verified,
            picture: None,
        })
    }
}
