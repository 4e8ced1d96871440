//! Password credentials.
//!
//! A user is provisioned either with a plaintext password, compared by exact
//! match, or with the SHA-256 hex digest of one, in which case the candidate
//! is hashed before comparing.

use sha2::{Digest, Sha256};

/// Stored password credential of a user.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Plaintext password.
    Plain(String),
    /// Lowercase SHA-256 hex digest of the password.
    Sha256(String),
}

impl Credential {
    /// Creates a credential from a SHA-256 hex digest.
    ///
    /// Returns `None` unless `digest` is 64 hex characters.
    pub fn from_sha256_hex(digest: &str) -> Option<Self> {
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Credential::Sha256(digest.to_ascii_lowercase()))
    }

    /// Checks a candidate password.
    pub fn verify(&self, candidate: &str) -> bool {
        match self {
            Credential::Plain(password) => password == candidate,
            Credential::Sha256(digest) => *digest == Self::hash_password(candidate),
        }
    }

    /// Hashes a password using SHA-256, returning a lowercase hex string.
    pub fn hash_password(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Plain(_) => f.write_str("Credential::Plain(..)"),
            Credential::Sha256(_) => f.write_str("Credential::Sha256(..)"),
        }
    }
}
