//! Split bearer tokens and password hashing.
//!
//! A split token is `"<id>.<secret>"`. The id is public and used for lookup; only
//! `SHA-256(salt || secret)` is ever persisted, and verification compares digests in
//! constant time.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

/// Random bytes in a token secret (256 bits).
const SECRET_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
/// Upper bound on accepted token length; anything longer is malformed.
const MAX_TOKEN_LEN: usize = 256;

pub const TOKEN_SEPARATOR: char = '.';

// ──────────────────────────────────────────────────────────────────────────────
// Split tokens
// ──────────────────────────────────────────────────────────────────────────────

/// A freshly issued token. Deliberately not `Debug`: it carries the raw secret.
pub struct IssuedToken {
    /// `"<id>.<secret>"`, handed to the bearer exactly once.
    pub combined: Zeroizing<String>,
    /// Hex-encoded `SHA-256(salt || secret)`, safe to persist.
    pub secret_hash: String,
    /// Hex-encoded random salt, safe to persist.
    pub salt: String,
    pub raw_secret: Zeroizing<String>,
}

/// Borrowed view of a parsed `"<id>.<secret>"` token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SplitToken<'a> {
    pub id: &'a str,
    pub secret: &'a str,
}

impl<'a> SplitToken<'a> {
    /// Parse a combined token. Returns `None` on malformed input: missing separator,
    /// empty halves, a secret containing the separator, or an oversized token.
    pub fn parse(combined: &'a str) -> Option<Self> {
        if combined.len() > MAX_TOKEN_LEN {
            return None;
        }
        let (id, secret) = combined.split_once(TOKEN_SEPARATOR)?;
        if id.is_empty() || secret.is_empty() || secret.contains(TOKEN_SEPARATOR) {
            return None;
        }
        Some(Self { id, secret })
    }

    pub fn format(&self) -> String {
        format!("{}{}{}", self.id, TOKEN_SEPARATOR, self.secret)
    }
}

impl std::fmt::Debug for SplitToken<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitToken")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Issue a new split token owned by `owner_id`.
pub fn issue(owner_id: &str) -> IssuedToken {
    let mut secret_bytes = Zeroizing::new([0u8; SECRET_BYTES]);
    OsRng.fill_bytes(secret_bytes.as_mut());
    let raw_secret = Zeroizing::new(URL_SAFE_NO_PAD.encode(secret_bytes.as_ref()));

    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);

    let digest = hash_secret(raw_secret.as_bytes(), &salt);
    let combined = Zeroizing::new(
        SplitToken {
            id: owner_id,
            secret: raw_secret.as_str(),
        }
        .format(),
    );

    IssuedToken {
        combined,
        secret_hash: hex::encode(digest),
        salt: hex::encode(salt),
        raw_secret,
    }
}

/// Verify a combined token against the stored hex hash and hex salt.
pub fn verify(combined: &str, stored_hash: &str, stored_salt: &str) -> bool {
    match SplitToken::parse(combined) {
        Some(token) => verify_secret(token.secret, stored_hash, stored_salt),
        None => false,
    }
}

/// Verify a raw secret against the stored hex hash and hex salt in constant time.
pub fn verify_secret(secret: &str, stored_hash: &str, stored_salt: &str) -> bool {
    let (Ok(expected), Ok(salt)) = (hex::decode(stored_hash), hex::decode(stored_salt)) else {
        return false;
    };
    let actual = hash_secret(secret.as_bytes(), &salt);
    actual.ct_eq(expected.as_slice()).into()
}

/// `SHA-256(salt || secret)`
pub fn hash_secret(secret: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret);
    hasher.finalize().into()
}

// ──────────────────────────────────────────────────────────────────────────────
// Passwords
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Hash a password with Argon2id and a random salt. Returns a PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordHashError::Hash)?;
    Ok(hash.to_string())
}

/// Check a password against a PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
