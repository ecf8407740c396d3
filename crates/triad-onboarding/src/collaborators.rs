//! Outside collaborators: outbound notifications and inviter eligibility.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use triad_storage::{InviteId, Store, StoreError, UserId, UserKind};

use crate::Clock;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Invitation sent to the prospective single. `invite_url` carries the bearer token.
#[derive(Clone)]
pub struct InviteEmail {
    pub to: String,
    pub inviter_name: String,
    pub role_label: &'static str,
    pub invite_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Sent after moderator approval. `activation_link` carries the bearer token.
#[derive(Clone)]
pub struct ActivationEmail {
    pub to: String,
    pub inviter_name: String,
    pub role_label: &'static str,
    pub activation_link: String,
    pub expires_at: DateTime<Utc>,
}

/// Admin notice for a freshly activated member.
#[derive(Clone, Debug)]
pub struct NewMemberDetails {
    pub user_id: UserId,
    pub invite_id: InviteId,
    pub inviter_id: UserId,
    pub email: String,
    pub nickname: String,
    pub account_created: bool,
}

/// Delivery of workflow notifications. Failures never fail the workflow step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invite_email(&self, email: InviteEmail) -> Result<(), NotifyError>;

    async fn send_activation_email(&self, email: ActivationEmail) -> Result<(), NotifyError>;

    async fn notify_admin_new_member(&self, details: NewMemberDetails)
        -> Result<(), NotifyError>;
}

/// Notifier that only records deliveries in the log. Token-bearing links are not logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invite_email(&self, email: InviteEmail) -> Result<(), NotifyError> {
        tracing::info!(
            to = %email.to,
            inviter = %email.inviter_name,
            role = email.role_label,
            expires_at = %email.expires_at,
            "invite email queued"
        );
        Ok(())
    }

    async fn send_activation_email(&self, email: ActivationEmail) -> Result<(), NotifyError> {
        tracing::info!(
            to = %email.to,
            inviter = %email.inviter_name,
            role = email.role_label,
            expires_at = %email.expires_at,
            "activation email queued"
        );
        Ok(())
    }

    async fn notify_admin_new_member(
        &self,
        details: NewMemberDetails,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %details.user_id.0,
            invite_id = %details.invite_id.0,
            inviter_id = %details.inviter_id.0,
            nickname = %details.nickname,
            account_created = details.account_created,
            "new member activated"
        );
        Ok(())
    }
}

/// Decides whether a user may send invites (membership, verification, account kind).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EligibilityService: Send + Sync {
    async fn is_inviter_eligible(&self, user_id: &UserId) -> Result<bool, StoreError>;
}

/// Eligibility read from the user record: an identity-verified couple account
/// whose membership has not expired.
pub struct StoreEligibility {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl StoreEligibility {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl EligibilityService for StoreEligibility {
    async fn is_inviter_eligible(&self, user_id: &UserId) -> Result<bool, StoreError> {
        let user = match self.store.get_user(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        let now = self.clock.now();
        Ok(user.kind == UserKind::Couple
            && user.identity_verified
            && user.membership_expires_at.is_some_and(|until| until > now))
    }
}
