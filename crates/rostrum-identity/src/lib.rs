//! Identity resolution: local credentials, Google and Apple sign-in, and collision-safe
//! username assignment, all converging on a single user row per person.

pub mod error;
pub mod providers;
pub mod resolver;
pub mod username;

pub use error::IdentityError;
pub use providers::{ProviderError, ProviderIdentity, ProviderVerifier};
pub use resolver::{AuthOutcome, AuthSession, IdentityResolver, MAX_CONFLICT_RETRIES};
