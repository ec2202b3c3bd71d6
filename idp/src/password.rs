//! Password KDF wrapper.
//! Mission: hash and verify passwords with a hardened KDF, and pay the same
//! cost for unknown usernames so login timing doesn't leak account existence.

use anyhow::{Context, Result};
use bcrypt::{hash, verify};

/// A bcrypt hash of a fixed, never-matching password, used so that looking
/// up an unknown username still costs one full KDF round.
const DUMMY_HASH: &str =
    "$2b$12$CwTycUXWue0Thq9StjUM0uJ8o6.L.3vQhktcJ2HMM6SCv9bjDBVXK";

pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        PasswordHasher { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).context("failed to hash password")
    }

    /// Verifies `password` against `stored_hash`, or against a dummy hash if
    /// `stored_hash` is `None` (unknown username). Returns `false` either way
    /// on mismatch; the caller cannot distinguish "wrong password" from
    /// "no such account" from the timing of this call alone.
    pub fn verify(&self, password: &str, stored_hash: Option<&str>) -> Result<bool> {
        let target = stored_hash.unwrap_or(DUMMY_HASH);
        let matched = verify(password, target).context("failed to verify password")?;
        Ok(matched && stored_hash.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies() {
        let hasher = PasswordHasher::new(4);
        let h = hasher.hash("Passw0rd!").unwrap();
        assert!(hasher.verify("Passw0rd!", Some(&h)).unwrap());
        assert!(!hasher.verify("wrong", Some(&h)).unwrap());
    }

    #[test]
    fn unknown_username_still_pays_hash_cost() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify("anything", None).unwrap());
    }
}
