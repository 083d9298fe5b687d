use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHash, Version};
use thiserror::Error;

// Trait methods only; the names would clash with our own `PasswordHasher`.
use argon2::{PasswordHasher as _, PasswordVerifier as _};

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),
}

/// Salted Argon2id hashing for local credentials.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Digest checked when the account does not exist, so a miss costs as much as a hit.
    decoy: String,
}

impl PasswordHasher {
    /// Argon2id with the crate's default cost (19 MiB, 2 passes).
    pub fn new() -> Result<Self, PasswordError> {
        Self::from_argon2(Argon2::default())
    }

    /// Argon2id with a custom memory cost (KiB) and pass count.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params =
            Params::new(memory_kib, iterations, 1, None).map_err(PasswordError::Params)?;
        Self::from_argon2(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn from_argon2(argon2: Argon2<'static>) -> Result<Self, PasswordError> {
        let mut hasher = Self {
            argon2,
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash("rostrum-decoy-password")?;
        Ok(hasher)
    }

    /// Hash `plaintext` into a PHC string with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(PasswordError::Hash)?
            .to_string();
        Ok(digest)
    }

    /// Check `plaintext` against a stored digest. A malformed or empty digest never matches.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend one verification for a login whose account does not exist. Always false.
    pub fn verify_absent(&self, plaintext: &str) -> bool {
        let _ = self.verify(plaintext, &self.decoy);
        false
    }
}
