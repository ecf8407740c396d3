//! Activation token types.

use chrono::{DateTime, Utc};

use super::{ActivationId, Invite, InviteId, InviteStatus, SingleProfile, User, UserId};

/// Activation token record. Issued after moderation approval.
#[derive(Clone, Debug)]
pub struct ActivationToken {
    pub id: ActivationId,
    pub invite_id: InviteId,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_by_user_id: UserId, // Moderator who approved
    pub created_at: DateTime<Utc>,
}

/// Parameters for issuing an activation token.
///
/// Backends must, atomically: mark every unconsumed token of the invite consumed,
/// insert the new token, and move the invite to `awaiting_activation` provided it
/// is currently in one of `allowed_from` (otherwise `StoreError::Conflict`).
#[derive(Clone, Debug)]
pub struct IssueActivationParams {
    pub id: ActivationId,
    pub invite_id: InviteId,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: DateTime<Utc>,
    pub created_by_user_id: UserId,
    pub allowed_from: Vec<InviteStatus>,
    pub at: DateTime<Utc>,
}

/// Parameters for redeeming an activation token.
#[derive(Clone, Debug)]
pub struct RedeemActivationParams {
    pub activation_id: ActivationId,
    pub password_hash: String,
    pub at: DateTime<Utc>,
}

/// Everything produced by a successful redemption.
#[derive(Clone, Debug)]
pub struct Redemption {
    pub invite: Invite,
    pub user: User,
    pub profile: SingleProfile,
    pub account_created: bool,
    /// `false` when an existing account kept the password it already had.
    pub password_set: bool,
}

/// Result of a redemption attempt.
#[derive(Clone, Debug)]
pub enum RedeemOutcome {
    Redeemed(Box<Redemption>),
    /// Token already consumed (including by a concurrent winner).
    Consumed,
    Expired,
    /// The invite left `awaiting_activation` (e.g. revoked after approval).
    InviteClosed,
}
