use serde::{Deserialize, Serialize};

use crate::models::{User, UserId};

// -- Session claims --

/// Session token claims, shared by the token issuer and the REST middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// The identity facts a session token is minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
}

impl From<&User> for SessionIdentity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/auth/google` and `POST /api/auth/apple`.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthRequest {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub token: String,
    pub user: User,
}

// -- Votes --

/// Body of `POST /api/posts/{id}/vote`. The raw value is validated by the handler so a
/// bad `vote_type` is a 400 with a readable message.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub message: String,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
