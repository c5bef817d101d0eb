use anyhow::Context;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

/// Argon2id v1.3 with the crate's recommended cost (m=19456 KiB, t=2, p=1).
/// Pinned here so stored hashes do not change shape if the crate default moves.
fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::DEFAULT)
}

/// PHC-encoded hash of `plain` under a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()
        .hash_password(plain.as_bytes(), &salt)
        .context("argon2 hash")?;
    Ok(hash.to_string())
}

/// A mismatch is `Ok(false)`. Errors mean the stored hash itself is unusable.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).context("stored password hash is not a PHC string")?;
    match hasher().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e).context("argon2 verify"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
        assert!(!hash.contains(password));
    }

    #[test]
    fn hashes_carry_pinned_parameters() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"), "{hash}");
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(!verify_password("wrong-password", &hash).expect("mismatch is not an error"));
    }

    #[test]
    fn same_password_hashes_differently_but_both_verify() {
        let first = hash_password("secret1").unwrap();
        let second = hash_password("secret1").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("secret1", &first).unwrap());
        assert!(verify_password("secret1", &second).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(err.to_string().contains("PHC"));
    }
}
