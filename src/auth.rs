//! Password hashing and session tokens.
//!
//! Tokens are random and handed back on login only; nothing validates them
//! on later requests.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const SALT_LEN: usize = 16;

/// `salt$digest`, both lowercase hex.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let salt = hex::encode(salt);

    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest(salt, password);

    // Compare every byte regardless of where the first mismatch is.
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub fn issue_token() -> String {
    Uuid::new_v4().to_string()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let stored = hash_password("tiles4ever");

        assert!(verify_password("tiles4ever", &stored));
        assert!(!verify_password("tiles4never", &stored));
        assert!(!stored.contains("tiles4ever"));
    }

    #[test]
    fn stored_form_is_hex_salt_and_digest() {
        let stored = hash_password("pw");
        let (salt, digest) = stored.split_once('$').expect("separator");

        assert_eq!(hex::decode(salt).expect("salt hex").len(), SALT_LEN);
        assert_eq!(hex::decode(digest).expect("digest hex").len(), 32);
    }

    #[test]
    fn same_password_gets_different_salts() {
        assert_ne!(hash_password("pw"), hash_password("pw"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw", "no-separator"));
        assert!(!verify_password("pw", "salt$short"));
    }

    #[test]
    fn tokens_are_unique_uuids() {
        let a = issue_token();
        assert_ne!(a, issue_token());
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
