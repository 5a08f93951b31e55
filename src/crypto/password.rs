//! Password hashing and verification with Argon2id.
//!
//! Hashes are PHC-format strings (`$argon2id$v=19$m=...`) carrying their own
//! random salt, so hashing the same plaintext twice yields different strings.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::errors::{RegistryError, Result};

/// # Errors
/// `Hash` when the hasher rejects the input.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| RegistryError::Hash(format!("failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Returns `Ok(false)` on mismatch.
///
/// # Errors
/// `Hash` when `hash` is not a parseable PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| RegistryError::Hash(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// True for strings that already look like an Argon2 PHC hash; such values
/// are stored as-is instead of being hashed again.
#[must_use]
pub fn is_password_hash(value: &str) -> bool {
    value.starts_with("$argon2") && PasswordHash::new(value).is_ok_and(|h| h.hash.is_some())
}
