use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rostrum_types::models::FederatedProvider;

use super::{ProviderError, ProviderIdentity, ProviderVerifier, flexible_bool};

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Checks Google ID tokens against the tokeninfo endpoint.
pub struct GoogleVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
    /// OAuth client id tokens must be minted for. Unchecked when unset.
    audience: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    email_verified: Option<bool>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    aud: Option<String>,
}

impl GoogleVerifier {
    pub fn new(client: reqwest::Client, audience: Option<String>) -> Self {
        Self {
            client,
            tokeninfo_url: GOOGLE_TOKENINFO_URL.to_string(),
            audience,
        }
    }

    pub fn with_tokeninfo_url(mut self, url: impl Into<String>) -> Self {
        self.tokeninfo_url = url.into();
        self
    }
}

#[async_trait]
impl ProviderVerifier for GoogleVerifier {
    fn provider(&self) -> FederatedProvider {
        FederatedProvider::Google
    }

    async fn verify(&self, token: &str) -> Result<ProviderIdentity, ProviderError> {
        if token.trim().is_empty() {
            return Err(ProviderError::Malformed("empty token"));
        }

        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(ProviderError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected(status));
        }

        let info: TokenInfo = response.json().await.map_err(ProviderError::BadResponse)?;

        if let Some(expected) = &self.audience {
            if info.aud.as_deref() != Some(expected.as_str()) {
                debug!("Google token minted for {:?}, expected {}", info.aud, expected);
                return Err(ProviderError::AudienceMismatch);
            }
        }
        if info.email_verified != Some(true) {
            return Err(ProviderError::EmailNotVerified);
        }
        if info.sub.is_empty() {
            return Err(ProviderError::Malformed("missing subject"));
        }

        Ok(ProviderIdentity {
            subject: info.sub,
            email: info.email,
            email_verified: true,
            picture: info.picture.filter(|p| !p.is_empty()),
        })
    }
}
