//! Identity
//!
//! Credential checking is an external collaborator; the relay only needs a
//! yes/no answer before binding an account name to a connection.
//!
//! Configured accounts store Argon2 hashes in PHC string format, never
//! plaintext passwords.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::collections::HashMap;

/// Identity-related errors
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Account '{account}' has an invalid password hash: {reason}")]
    InvalidHash { account: String, reason: String },
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

pub trait CredentialValidator: Send + Sync {
    /// Returns the canonical account name when the credentials are valid
    fn validate(&self, account: &str, password: &str) -> Option<String>;
}

/// Hash a password with Argon2id and a random salt, returning the PHC string
/// to put in the `[accounts]` table.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Hashing(e.to_string()))?
        .to_string();
    Ok(hash)
}

/// Accounts taken from the server configuration.
///
/// Account names match case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    /// Lowercased account -> (canonical account, PHC hash)
    accounts: HashMap<String, (String, String)>,
}

impl StaticCredentials {
    /// Build from `account -> PHC hash` pairs. Fails on the first value that
    /// does not parse as a hash, so a plaintext password never loads.
    pub fn new(accounts: &HashMap<String, String>) -> Result<Self, IdentityError> {
        let mut parsed = HashMap::with_capacity(accounts.len());
        for (name, hash) in accounts {
            PasswordHash::new(hash).map_err(|e| IdentityError::InvalidHash {
                account: name.clone(),
                reason: e.to_string(),
            })?;
            parsed.insert(name.to_lowercase(), (name.clone(), hash.clone()));
        }
        Ok(Self { accounts: parsed })
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl CredentialValidator for StaticCredentials {
    fn validate(&self, account: &str, password: &str) -> Option<String> {
        let (canonical, hash) = self.accounts.get(&account.trim().to_lowercase())?;
        let parsed = PasswordHash::new(hash).ok()?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Some(canonical.clone()),
            Err(argon2::password_hash::Error::Password) => None,
            Err(e) => {
                log::warn!("Password verification for {} failed: {}", canonical, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> StaticCredentials {
        let mut accounts = HashMap::new();
        accounts.insert("Alice".to_string(), hash_password("hunter2").unwrap());
        StaticCredentials::new(&accounts).unwrap()
    }

    #[test]
    fn test_hash_is_phc_and_salted() {
        let first = hash_password("hunter2").unwrap();
        let second = hash_password("hunter2").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert!(!first.contains("hunter2"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_valid_credentials() {
        let creds = credentials();
        assert_eq!(creds.validate("alice", "hunter2").as_deref(), Some("Alice"));
        assert_eq!(creds.validate(" ALICE ", "hunter2").as_deref(), Some("Alice"));
    }

    #[test]
    fn test_invalid_credentials() {
        let creds = credentials();
        assert!(creds.validate("alice", "hunter3").is_none());
        assert!(creds.validate("alice", "hunter22").is_none());
        assert!(creds.validate("alice", "").is_none());
        assert!(creds.validate("bob", "hunter2").is_none());
        assert!(StaticCredentials::default().validate("alice", "hunter2").is_none());
    }

    #[test]
    fn test_plaintext_password_is_rejected() {
        let mut accounts = HashMap::new();
        accounts.insert("alice".to_string(), "hunter2".to_string());
        let err = StaticCredentials::new(&accounts).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidHash { ref account, .. } if account == "alice"));
    }
}
