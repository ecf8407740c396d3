//! Verification session types: the moderation record for an invitee's submission.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::{InviteId, SessionId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    AwaitingProfile,
    AwaitingUploads,
    UnderReview,
    Approved,
    Rejected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::AwaitingProfile => "awaiting_profile",
            SessionStatus::AwaitingUploads => "awaiting_uploads",
            SessionStatus::UnderReview => "under_review",
            SessionStatus::Approved => "approved",
            SessionStatus::Rejected => "rejected",
        }
    }

    /// A decided session is closed to further submissions and decisions.
    pub fn is_decided(&self) -> bool {
        matches!(self, SessionStatus::Approved | SessionStatus::Rejected)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_profile" => Ok(SessionStatus::AwaitingProfile),
            "awaiting_uploads" => Ok(SessionStatus::AwaitingUploads),
            "under_review" => Ok(SessionStatus::UnderReview),
            "approved" => Ok(SessionStatus::Approved),
            "rejected" => Ok(SessionStatus::Rejected),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Weekly availability carried over into the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub evenings_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Profile data submitted by the invitee for moderation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSubmission {
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_preferences: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundaries: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    IdentityDocument,
}

/// Opaque reference to media held by the blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaRef {
    pub blob_ref: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Verification session record
#[derive(Clone, Debug)]
pub struct VerificationSession {
    pub id: SessionId,
    pub invite_id: InviteId, // Unique: one session per invite
    pub invitee_email: String,
    pub status: SessionStatus,
    pub profile: Option<ProfileSubmission>,
    pub media: Vec<MediaRef>,
    pub moderation_notes: Option<String>,
    pub decision_user_id: Option<UserId>,
    pub decision_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for opening (get-or-create) the session of an invite
#[derive(Clone, Debug)]
pub struct OpenSessionParams {
    pub id: SessionId, // Used only if the session does not exist yet
    pub invite_id: InviteId,
    pub invitee_email: String,
    pub at: DateTime<Utc>,
}

/// Moderator decision metadata
#[derive(Clone, Debug)]
pub struct SessionDecision {
    pub decided_by: UserId,
    pub decided_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
}

/// Compare-and-set update of a session.
///
/// Applies only while the session status is one of `from`. `None` fields are left
/// untouched.
#[derive(Clone, Debug)]
pub struct SessionUpdate {
    pub session_id: SessionId,
    pub from: Vec<SessionStatus>,
    pub to: SessionStatus,
    pub profile: Option<ProfileSubmission>,
    pub media: Option<Vec<MediaRef>>,
    pub decision: Option<SessionDecision>,
    pub at: DateTime<Utc>,
}
