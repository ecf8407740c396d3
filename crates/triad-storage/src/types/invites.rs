//! Invite types.

use chrono::{DateTime, Utc};

use super::{InviteId, UserId};

/// Lifecycle stage of an invite.
///
/// ```text
/// pending → awaiting_verification → awaiting_activation → awaiting_couple → completed
/// ```
///
/// `revoked`, `declined` and `expired` are terminal exits reachable from any
/// non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InviteStatus {
    Pending,
    AwaitingVerification,
    AwaitingActivation,
    AwaitingCouple,
    Completed,
    Revoked,
    Declined,
    Expired,
}

impl InviteStatus {
    /// Every status an invite can still move out of.
    pub const NON_TERMINAL: [InviteStatus; 4] = [
        InviteStatus::Pending,
        InviteStatus::AwaitingVerification,
        InviteStatus::AwaitingActivation,
        InviteStatus::AwaitingCouple,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InviteStatus::Completed
                | InviteStatus::Revoked
                | InviteStatus::Declined
                | InviteStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::AwaitingVerification => "awaiting_verification",
            InviteStatus::AwaitingActivation => "awaiting_activation",
            InviteStatus::AwaitingCouple => "awaiting_couple",
            InviteStatus::Completed => "completed",
            InviteStatus::Revoked => "revoked",
            InviteStatus::Declined => "declined",
            InviteStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "awaiting_verification" => Ok(InviteStatus::AwaitingVerification),
            "awaiting_activation" => Ok(InviteStatus::AwaitingActivation),
            "awaiting_couple" => Ok(InviteStatus::AwaitingCouple),
            "completed" => Ok(InviteStatus::Completed),
            "revoked" => Ok(InviteStatus::Revoked),
            "declined" => Ok(InviteStatus::Declined),
            "expired" => Ok(InviteStatus::Expired),
            _ => Err(format!("Unknown invite status: {}", s)),
        }
    }
}

/// Role the invitee is invited into. The two roles are mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InviteRole {
    SingleFemale,
    SingleMale,
}

impl InviteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteRole::SingleFemale => "single_female",
            InviteRole::SingleMale => "single_male",
        }
    }

    /// Human-readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            InviteRole::SingleFemale => "Single woman",
            InviteRole::SingleMale => "Single man",
        }
    }
}

impl std::fmt::Display for InviteRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InviteRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_female" => Ok(InviteRole::SingleFemale),
            "single_male" => Ok(InviteRole::SingleMale),
            _ => Err(format!("Unknown invite role: {}", s)),
        }
    }
}

/// Invite record
#[derive(Clone, Debug)]
pub struct Invite {
    pub id: InviteId,
    pub inviter_id: UserId,
    pub invitee_email: String,
    pub role: InviteRole,
    pub status: InviteStatus,
    pub token_hash: String, // hex SHA-256(salt || secret); the secret itself is never stored
    pub token_salt: String, // hex
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub invitee_user_id: Option<UserId>, // Set once activation links an account
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating an invite
#[derive(Clone, Debug)]
pub struct CreateInviteParams {
    pub id: InviteId, // Chosen by the caller so the token can embed it
    pub inviter_id: UserId,
    pub invitee_email: String,
    pub role: InviteRole,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: DateTime<Utc>,
    /// Refuse the insert (`StoreError::LimitReached`) if the inviter already has
    /// this many active invites. Checked in the same statement as the insert.
    pub active_limit: Option<u32>,
    pub at: DateTime<Utc>,
}

/// Compare-and-set status change for an invite.
///
/// The change only applies while the invite is in one of `from`; the backend
/// performs it as a single conditional statement.
#[derive(Clone, Debug)]
pub struct InviteTransition {
    pub invite_id: InviteId,
    pub from: Vec<InviteStatus>,
    pub to: InviteStatus,
    pub stamp_consumed: bool,
    pub at: DateTime<Utc>,
}
