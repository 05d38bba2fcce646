//! Account passwords, stored as Argon2id PHC strings

use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),
    #[error("stored password hash for account is unusable: {0}")]
    Corrupt(password_hash::Error),
}

/// Hash for a new or changed account password, with a fresh salt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordError::Hash)?;
    Ok(hash.to_string())
}

/// A wrong password is `Ok(false)`. Only a stored hash that cannot be
/// checked at all is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let stored = PasswordHash::new(stored).map_err(PasswordError::Corrupt)?;

    match Argon2::default().verify_password(password.as_bytes(), &stored) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(other) => Err(PasswordError::Corrupt(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn test_account_password_round() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$argon2id$"));

        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("correct horse ", &stored).unwrap());
        assert!(!verify_password("", &stored).unwrap());
    }

    #[test]
    fn test_same_password_new_salt() {
        assert_ne!(hash_password("pw123").unwrap(), hash_password("pw123").unwrap());
    }

    #[test]
    fn test_unusable_stored_hash() {
        let err = verify_password("pw123", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, PasswordError::Corrupt(_)));
    }

    #[test]
    fn test_password_failure_is_server_error() {
        let err = verify_password("pw123", "").unwrap_err();
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
