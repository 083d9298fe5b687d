use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Identifiers --

/// Numeric user id, carried typed from the token middleware into every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// -- Users --

/// How an account was first created. Linking a provider later never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Email,
    Google,
    Apple,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown auth provider '{}'", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for AuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// The third-party identity providers accepted for OAuth login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FederatedProvider {
    Google,
    Apple,
}

impl FederatedProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for FederatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FederatedProvider> for AuthProvider {
    fn from(provider: FederatedProvider) -> Self {
        match provider {
            FederatedProvider::Google => Self::Google,
            FederatedProvider::Apple => Self::Apple,
        }
    }
}

/// Public view of a user. Password hashes and provider subject ids never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub bio: String,
    /// Avatar preset ("1".."6") or an image URL.
    pub avatar: String,
    pub auth_provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

// -- Votes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// Value stored in `votes.vote_type`.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidVoteType(pub i64);

impl fmt::Display for InvalidVoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vote type must be -1 or 1, got {}", self.0)
    }
}

impl std::error::Error for InvalidVoteType {}

impl TryFrom<i64> for VoteDirection {
    type Error = InvalidVoteType;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(InvalidVoteType(other)),
        }
    }
}

impl From<VoteDirection> for i64 {
    fn from(direction: VoteDirection) -> Self {
        direction.as_i64()
    }
}

/// What a vote is cast on. Storage populates exactly one of `post_id` / `comment_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(PostId),
    Comment(CommentId),
}

impl VoteTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Post(_) => "post",
            Self::Comment(_) => "comment",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Post(id) => id.0,
            Self::Comment(id) => id.0,
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind(), self.id())
    }
}

/// Row-level change the ledger has to apply for one cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Insert(VoteDirection),
    Update(VoteDirection),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoteOutcome {
    Recorded,
    Updated,
    Removed,
}

impl VoteOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Recorded => "Vote recorded",
            Self::Updated => "Vote updated",
            Self::Removed => "Vote removed",
        }
    }
}

/// Toggle/switch transition for a single (voter, target) pair.
///
/// `current` is the voter's standing vote, if any. Casting the same direction again
/// removes it; casting the opposite direction replaces it.
pub fn transition(
    current: Option<VoteDirection>,
    requested: VoteDirection,
) -> (Option<VoteDirection>, LedgerChange, VoteOutcome) {
    match current {
        None => (
            Some(requested),
            LedgerChange::Insert(requested),
            VoteOutcome::Recorded,
        ),
        Some(existing) if existing == requested => (None, LedgerChange::Delete, VoteOutcome::Removed),
        Some(_) => (
            Some(requested),
            LedgerChange::Update(requested),
            VoteOutcome::Updated,
        ),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: u64,
    pub downvotes: u64,
}
