//! Database row types. These map directly to SQLite rows and stay separate from the
//! rostrum-types API models so credentials never leak past this crate by accident.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use tracing::warn;

use rostrum_types::models::{AuthProvider, FederatedProvider, User, UserId};

use crate::DbError;

/// Column list shared by every user query; `UserRow::from_row` reads in this order.
pub(crate) const USER_COLUMNS: &str = "id, username, email, password_hash, bio, avatar, \
     auth_provider, google_id, apple_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Empty for OAuth-only accounts.
    pub password_hash: String,
    pub bio: String,
    pub avatar: String,
    pub auth_provider: String,
    pub google_id: Option<String>,
    pub apple_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            bio: row.get(4)?,
            avatar: row.get(5)?,
            auth_provider: row.get(6)?,
            google_id: row.get(7)?,
            apple_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    pub fn subject_for(&self, provider: FederatedProvider) -> Option<&str> {
        match provider {
            FederatedProvider::Google => self.google_id.as_deref(),
            FederatedProvider::Apple => self.apple_id.as_deref(),
        }
        .filter(|s| !s.is_empty())
    }

    pub fn into_user(self) -> Result<User, DbError> {
        let auth_provider: AuthProvider = self
            .auth_provider
            .parse()
            .map_err(|e| DbError::Corrupt(format!("user {}: {}", self.id, e)))?;

        let created_at = parse_timestamp(&self.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on user {}", self.created_at, self.id);
            DateTime::default()
        });

        Ok(User {
            id: UserId(self.id),
            username: self.username,
            email: self.email,
            bio: self.bio,
            avatar: self.avatar,
            auth_provider,
            created_at,
        })
    }
}

/// Fields for a brand-new user row.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub avatar: &'a str,
    pub auth_provider: AuthProvider,
    pub google_id: Option<&'a str>,
    pub apple_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRow {
    pub id: i64,
    pub user_id: i64,
    pub vote_type: i64,
}

/// SQLite's `datetime('now')` has no timezone; it is always UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}
