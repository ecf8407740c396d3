//! User types.

use chrono::{DateTime, Utc};

use super::UserId;

/// Account kind. A couple account invites; a single account is invited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserKind {
    Couple,
    Single,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Couple => "couple",
            UserKind::Single => "single",
        }
    }
}

impl std::fmt::Display for UserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "couple" => Ok(UserKind::Couple),
            "single" => Ok(UserKind::Single),
            _ => Err(format!("Unknown user kind: {}", s)),
        }
    }
}

/// User record
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub email: String, // Normalized (trimmed, lowercased)
    pub kind: UserKind,
    pub display_name: String,
    pub password_hash: Option<String>, // Argon2id PHC string; None until credentials are set
    pub identity_verified: bool,       // For couples: both partners verified
    pub membership_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a user
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub email: String,
    pub kind: UserKind,
    pub display_name: String,
    pub password_hash: Option<String>,
    pub identity_verified: bool,
    pub membership_expires_at: Option<DateTime<Utc>>,
}

/// Normalize an email address for lookup and uniqueness.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
