use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};

/// Length of the opaque remember token issued at login.
pub const TOKEN_LEN: usize = 60;

/// HashError
///
/// Argon2 refused to produce a hash. Only reachable with invalid parameters,
/// surfaced to clients as a 500.
#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// hash_password
///
/// Argon2id with the crate defaults and a fresh random salt, stored as a PHC
/// string (`$argon2id$v=19$...`).
pub fn hash_password(plain: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// verify_password
///
/// Returns false for any stored value that is not a parseable PHC string.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// generate_token
///
/// A fresh random alphanumeric bearer token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
