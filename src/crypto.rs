//! Crypto utilities: Argon2id password hashing and SHA-256 token digests.

pub mod password;

pub use password::{hash_password, is_password_hash, verify_password};

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `input`; bearer tokens and codes are stored
/// only in this form.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        assert_eq!(sha256_hex("abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
