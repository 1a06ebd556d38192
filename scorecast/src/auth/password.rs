//! Password hashing and verification.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a password using Argon2 with the given parameters.
pub fn hash_password_with_params(password: &str, params: Argon2Params) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.to_argon2()?;

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Hash a password using Argon2 with default secure parameters.
pub fn hash_password(password: &str) -> Result<String, Error> {
    hash_password_with_params(password, Argon2Params::default())
}

/// Verify a password against a stored hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse password hash: {e}"),
    })?;

    let argon2 = Argon2::default();
    Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Verify a password for a user that may not exist.
///
/// An unknown user (`hash` is `None`) still pays for one Argon2 hash with the default
/// parameters, so response time does not reveal which usernames are configured.
pub fn verify_password_or_decoy(password: &str, hash: Option<&str>) -> Result<bool, Error> {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => hash_password(password).map(|_| false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters keep the test suite fast
    const TEST_PARAMS: Argon2Params = Argon2Params {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn test_password_hashing() {
        let hash = hash_password_with_params("correct horse", TEST_PARAMS).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let hash1 = hash_password_with_params("password", TEST_PARAMS).unwrap();
        let hash2 = hash_password_with_params("password", TEST_PARAMS).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("password", &hash1).unwrap());
        assert!(verify_password("password", &hash2).unwrap());
    }

    #[test]
    fn test_default_params_produce_verifiable_hash() {
        let hash = hash_password("password").unwrap();
        assert!(hash.contains("m=19456,t=2,p=1"));
        assert!(verify_password("password", &hash).unwrap());
    }

    #[test]
    fn test_unknown_user_never_verifies() {
        let hash = hash_password_with_params("password", TEST_PARAMS).unwrap();

        assert!(verify_password_or_decoy("password", Some(&hash)).unwrap());
        assert!(!verify_password_or_decoy("wrong", Some(&hash)).unwrap());
        assert!(!verify_password_or_decoy("password", None).unwrap());
        assert!(!verify_password_or_decoy("", None).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_password("password", "not-a-hash").is_err());
    }
}
