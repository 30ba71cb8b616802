//! Password hashing capability.
//!
//! Hashing and verification go through one trait so the scheme is decided in
//! exactly one place. Legacy hashes from older cost settings verify fine but
//! report `needs_rehash`, letting login upgrade them opportunistically.

use tracing::warn;

use crate::common::{AppError, AppResult};

pub trait Hasher: Send + Sync {
    fn hash(&self, plain: &str) -> AppResult<String>;
    fn verify(&self, plain: &str, hash: &str) -> bool;
    /// Whether a stored hash should be regenerated on next successful login.
    fn needs_rehash(&self, hash: &str) -> bool;
}

pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl Hasher for BcryptHasher {
    fn hash(&self, plain: &str) -> AppResult<String> {
        bcrypt::hash(plain, self.cost)
            .map_err(|e| AppError::Database {
                kind: crate::common::DbErrorKind::Other,
                message: format!("password hashing failed: {e}"),
            })
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        match bcrypt::verify(plain, hash) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("stored password hash is not verifiable: {e}");
                false
            }
        }
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        match parse_bcrypt_cost(hash) {
            Some(cost) => cost < self.cost,
            // Unknown scheme: verification already failed or will fail, and a
            // successful directory login should replace it.
            None => true,
        }
    }
}

/// Extract the cost factor from a `$2a$`/`$2b$`/`$2y$` hash.
fn parse_bcrypt_cost(hash: &str) -> Option<u32> {
    let mut parts = hash.split('$');
    parts.next()?; // leading empty segment
    let version = parts.next()?;
    if !matches!(version, "2a" | "2b" | "2x" | "2y") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = BcryptHasher::new(4);
        let hash = hasher.hash("hunter2").expect("hash");
        assert!(hasher.verify("hunter2", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        let hasher = BcryptHasher::new(4);
        assert!(!hasher.verify("hunter2", "md5$abcdef"));
    }

    #[test]
    fn low_cost_hash_needs_rehash() {
        let low = BcryptHasher::new(4);
        let hash = low.hash("hunter2").expect("hash");
        let current = BcryptHasher::new(10);
        assert!(current.needs_rehash(&hash));
        assert!(!low.needs_rehash(&hash));
    }

    #[test]
    fn legacy_scheme_needs_rehash() {
        let hasher = BcryptHasher::new(4);
        assert!(hasher.needs_rehash("md5$abcdef"));
    }
}
