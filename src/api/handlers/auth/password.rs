//! Argon2id password hashing and verification.
//!
//! Hashes use the PHC string format so parameters and salt travel with the
//! hash itself.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Minimum accepted password length, in bytes.
pub(crate) const MIN_PASSWORD_LENGTH: usize = 12;

/// Hash a plaintext password with a random salt.
pub(crate) fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; other errors indicate a malformed hash.
pub(crate) fn verify_password(
    password: &str,
    hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};

    #[test]
    fn hash_and_verify_round_trip() -> Result<(), argon2::password_hash::Error> {
        let hash = hash_password("correct-horse-battery-staple")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery-staple", &hash)?);
        assert!(!verify_password("wrong-password", &hash)?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("password", "not-a-phc-string").is_err());
    }
}
