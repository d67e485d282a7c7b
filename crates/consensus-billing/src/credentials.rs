//! Password hashing
//!
//! Hashes are PBKDF2-HMAC-SHA256 in PHC string form,
//! `$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`, so every stored hash
//! carries its own iteration count and verification keeps working after
//! the configured count changes.

use crate::error::{BillingError, Result};
use pbkdf2::Pbkdf2;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Iteration count for new hashes unless configured otherwise
pub const DEFAULT_ROUNDS: u32 = 100_000;
/// Lowest iteration count accepted for new hashes
pub const MIN_ROUNDS: u32 = 1_000;

const MIN_PASSWORD_LEN: usize = 8;
const OUTPUT_LEN: usize = 32;

/// Hash `password` with a fresh random salt and `rounds` iterations
pub fn hash_password(password: &str, rounds: u32) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BillingError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if rounds < MIN_ROUNDS {
        return Err(BillingError::Config(format!(
            "password rounds must be at least {MIN_ROUNDS}, got {rounds}"
        )));
    }

    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| BillingError::Validation(format!("cannot encode salt: {e}")))?;
    let params = pbkdf2::Params {
        rounds,
        output_length: OUTPUT_LEN,
    };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|e| BillingError::Validation(format!("cannot hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored hash
///
/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .is_ok_and(|hash| Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse", MIN_ROUNDS).unwrap();
        assert!(hash.starts_with("$pbkdf2-sha256$"));
        assert!(hash.contains("i=1000"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same password", MIN_ROUNDS).unwrap();
        let b = hash_password("same password", MIN_ROUNDS).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same password", &a));
        assert!(verify_password("same password", &b));
    }

    #[test]
    fn test_stored_rounds_are_used_for_verification() {
        let older = hash_password("long enough", MIN_ROUNDS).unwrap();
        let newer = hash_password("long enough", MIN_ROUNDS * 2).unwrap();
        assert!(newer.contains("i=2000"));
        assert!(verify_password("long enough", &older));
        assert!(verify_password("long enough", &newer));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            hash_password("short", MIN_ROUNDS),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_too_few_rounds_rejected() {
        assert!(matches!(
            hash_password("long enough", 10),
            Err(BillingError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "md5$00$00"));
        assert!(!verify_password("anything", "sha256$zz$zz"));
        assert!(!verify_password("anything", "$pbkdf2-sha256$i=1000,l=32$!!$!!"));
    }
}
