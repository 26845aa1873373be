use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::domain::error::AppError;

/// Memory-hard password hashing per §4.10. `verify_password` is
/// constant-time by construction — Argon2's verifier never short-circuits
/// on the first mismatched byte.
pub struct PasswordHasherService;

impl PasswordHasherService {
    pub fn hash(password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hash failed: {e}")))
    }

    pub fn verify(password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("malformed password hash: {e}")))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let hash = PasswordHasherService::hash("correct horse battery staple").unwrap();
        assert!(PasswordHasherService::verify("correct horse battery staple", &hash).unwrap());
    }

    #[test]
    fn rejects_wrong_password() {
        let hash = PasswordHasherService::hash("correct horse battery staple").unwrap();
        assert!(!PasswordHasherService::verify("wrong password", &hash).unwrap());
    }

    #[test]
    fn distinct_hashes_for_same_password() {
        let a = PasswordHasherService::hash("same-password").unwrap();
        let b = PasswordHasherService::hash("same-password").unwrap();
        assert_ne!(a, b, "salts must differ");
    }
}
