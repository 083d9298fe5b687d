//! Rostrum credential primitives.
//!
//! - `password`: Argon2id hashing for local accounts.
//! - `token`: HS256 session tokens carrying the session claims.
//!
//! Neither holds database handles or reads the environment.

pub mod password;
pub mod token;

pub use password::{PasswordError, PasswordHasher};
pub use token::{CLOCK_SKEW_LEEWAY_SECS, SESSION_TTL_HOURS, TokenError, TokenIssuer};
