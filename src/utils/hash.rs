use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use crate::error::AppError;

/// Hashes a plaintext password into a PHC string for `users.password`.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Returns `Ok(false)` on mismatch; only a malformed stored hash is an error.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Verifies credentials, mapping a mismatch to `AuthError`.
pub fn ensure_password(password: &str, password_hash: &str) -> Result<(), AppError> {
    if verify_password(password, password_hash)? {
        Ok(())
    } else {
        Err(AppError::AuthError("Invalid email or password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_ensure_password_rejects_mismatch() {
        let hash = hash_password("pw123456").unwrap();
        assert!(ensure_password("pw123456", &hash).is_ok());
        assert!(matches!(
            ensure_password("nope", &hash),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn test_malformed_hash_is_internal_error() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(AppError::InternalServerError(_))
        ));
    }
}
