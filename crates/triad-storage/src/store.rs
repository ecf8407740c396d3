//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait `triad-onboarding` depends on.
///
/// Status changes are expressed as compare-and-set operations so that concurrent
/// callers race on the database row rather than on application locks.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create a new user. Fails with `AlreadyExists` if the normalized email is taken.
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError>;

    /// Get user by ID.
    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Get user by (normalized) email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    /// Persist a new invite in status `pending`. Idempotent on `params.id`; fails with
    /// `LimitReached` if `params.active_limit` would be exceeded.
    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError>;

    /// Get invite by ID.
    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError>;

    /// List every invite created by a user, most recent first (terminal ones included).
    async fn list_invites_for_inviter(&self, inviter_id: &UserId)
        -> Result<Vec<Invite>, StoreError>;

    /// Count the inviter's active invites: non-terminal, excluding `pending` invites
    /// whose expiry is at or before `now`.
    async fn count_active_invites(
        &self,
        inviter_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Atomically apply a status transition. Returns the updated invite, or `None`
    /// if the invite was not in one of the expected statuses.
    async fn transition_invite(
        &self,
        transition: &InviteTransition,
    ) -> Result<Option<Invite>, StoreError>;

    // ───────────────────────────────────── Activations ────────────────────────────────────

    /// Issue an activation token, invalidating earlier ones (see [`IssueActivationParams`]).
    async fn issue_activation(
        &self,
        params: &IssueActivationParams,
    ) -> Result<ActivationToken, StoreError>;

    /// Get activation token by ID.
    async fn get_activation(
        &self,
        activation_id: &ActivationId,
    ) -> Result<ActivationToken, StoreError>;

    /// Redeem an activation token as one unit of work: claim the token, look up or
    /// create the single account, link it to the invite and hydrate the profile.
    /// Fails with `Conflict` if the invitee email belongs to a couple account.
    async fn redeem_activation(
        &self,
        params: &RedeemActivationParams,
    ) -> Result<RedeemOutcome, StoreError>;

    // ───────────────────────────────────── Verification Sessions ──────────────────────────

    /// Get or create the session of an invite. The flag is `true` if it was created.
    async fn open_session(
        &self,
        params: &OpenSessionParams,
    ) -> Result<(VerificationSession, bool), StoreError>;

    /// Get session by ID.
    async fn get_session(&self, session_id: &SessionId)
        -> Result<VerificationSession, StoreError>;

    /// Get the session belonging to an invite.
    async fn get_session_for_invite(
        &self,
        invite_id: &InviteId,
    ) -> Result<VerificationSession, StoreError>;

    /// Atomically update a session. Returns `None` if the status precondition failed.
    async fn update_session(
        &self,
        update: &SessionUpdate,
    ) -> Result<Option<VerificationSession>, StoreError>;

    // ───────────────────────────────────── Profiles & Reviews ─────────────────────────────

    /// Get the single profile owned by a user.
    async fn get_single_profile(&self, user_id: &UserId) -> Result<SingleProfile, StoreError>;

    /// Insert a review and return it with the refreshed aggregate for its subject.
    /// Fails with `AlreadyExists` if the couple already reviewed this single.
    async fn create_review(
        &self,
        params: &CreateReviewParams,
    ) -> Result<(Review, ReviewSummary), StoreError>;

    /// List reviews of a single, newest first.
    async fn list_reviews(&self, single_user_id: &UserId) -> Result<Vec<Review>, StoreError>;

    /// Aggregate over all reviews of a single.
    async fn review_summary(&self, single_user_id: &UserId) -> Result<ReviewSummary, StoreError>;
}
