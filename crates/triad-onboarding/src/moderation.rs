//! Moderator decisions: approve, reject a session, decline an invite.

use serde_json::json;
use triad_audit::{EventKind, InviteEvent};
use triad_storage::{
    ActivationId, Invite, InviteId, InviteStatus, InviteTransition, IssueActivationParams,
    SessionDecision, SessionId, SessionStatus, SessionUpdate, StoreError, UserId,
    VerificationSession,
};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::not_found;
use crate::{ActivationEmail, Onboarding, OnboardingError, Result};

const REASON_MAX_CHARS: usize = 1000;

/// What the moderator (and the activation email) needs after an approval.
/// `activation_link` is the only copy of the activation token.
pub struct ApprovalNotice {
    pub activation_id: ActivationId,
    pub activation_link: Zeroizing<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub invitee_email: String,
    pub inviter_name: String,
    pub role_label: &'static str,
}

impl std::fmt::Debug for ApprovalNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalNotice")
            .field("activation_id", &self.activation_id)
            .field("activation_link", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("invitee_email", &self.invitee_email)
            .finish_non_exhaustive()
    }
}

pub struct ModerationGate<'a> {
    ctx: &'a Onboarding,
}

impl<'a> ModerationGate<'a> {
    pub(crate) fn new(ctx: &'a Onboarding) -> Self {
        Self { ctx }
    }

    /// Approve an invitee and issue a fresh activation token.
    ///
    /// Earlier activation tokens for the invite stop working.
    pub async fn approve(
        &self,
        invite_id: &InviteId,
        moderator_id: &UserId,
    ) -> Result<ApprovalNotice> {
        let invite = self.fetch(invite_id).await?;
        if invite.status.is_terminal() || invite.status == InviteStatus::AwaitingCouple {
            return Err(OnboardingError::transition(format!(
                "cannot approve an invite in status {}",
                invite.status
            )));
        }

        let now = self.ctx.now();
        let activation_id = ActivationId(Uuid::now_v7());
        let token = triad_crypto::issue(&activation_id.0.to_string());
        let expires_at = now
            .checked_add_signed(self.ctx.settings.activation_ttl)
            .ok_or_else(|| {
                OnboardingError::Validation("activation lifetime is too long".into())
            })?;

        self.ctx
            .store
            .issue_activation(&IssueActivationParams {
                id: activation_id.clone(),
                invite_id: invite_id.clone(),
                token_hash: token.secret_hash.clone(),
                token_salt: token.salt.clone(),
                expires_at,
                created_by_user_id: moderator_id.clone(),
                allowed_from: vec![
                    InviteStatus::Pending,
                    InviteStatus::AwaitingVerification,
                    InviteStatus::AwaitingActivation,
                ],
                at: now,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    OnboardingError::transition("invite changed before it could be approved")
                }
                other => not_found("invite")(other),
            })?;

        if let Some(session) = self.session_for(invite_id).await? {
            self.ctx
                .store
                .update_session(&SessionUpdate {
                    session_id: session.id.clone(),
                    from: vec![
                        SessionStatus::AwaitingProfile,
                        SessionStatus::AwaitingUploads,
                        SessionStatus::UnderReview,
                        SessionStatus::Rejected,
                    ],
                    to: SessionStatus::Approved,
                    profile: None,
                    media: None,
                    decision: Some(SessionDecision {
                        decided_by: moderator_id.clone(),
                        decided_at: now,
                        rejection_reason: None,
                        notes: None,
                    }),
                    at: now,
                })
                .await?;
        }

        let inviter_name = match self.ctx.store.get_user(&invite.inviter_id).await {
            Ok(user) => user.display_name,
            Err(StoreError::NotFound) => String::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            invite_id = %invite_id.0,
            moderator_id = %moderator_id.0,
            activation_id = %activation_id.0,
            "invite approved"
        );
        self.ctx
            .record(
                InviteEvent::builder(invite_id, EventKind::Approved)
                    .actor(Some(moderator_id))
                    .details(json!({
                        "activation_id": activation_id.0,
                        "expires_at": expires_at,
                    }))
                    .at(now)
                    .build(),
            )
            .await;

        let activation_link = Zeroizing::new(self.ctx.link("activate", &token.combined));
        let role_label = invite.role.label();
        self.ctx
            .notify(
                "activation_email",
                self.ctx.notifier.send_activation_email(ActivationEmail {
                    to: invite.invitee_email.clone(),
                    inviter_name: inviter_name.clone(),
                    role_label,
                    activation_link: activation_link.to_string(),
                    expires_at,
                }),
            )
            .await;

        Ok(ApprovalNotice {
            activation_id,
            activation_link,
            expires_at,
            invitee_email: invite.invitee_email,
            inviter_name,
            role_label,
        })
    }

    /// Reject a verification session. The invite itself keeps its status.
    pub async fn reject(
        &self,
        session_id: &SessionId,
        moderator_id: &UserId,
        reason: &str,
    ) -> Result<VerificationSession> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OnboardingError::Validation(
                "a rejection reason is required".into(),
            ));
        }
        if reason.chars().count() > REASON_MAX_CHARS {
            return Err(OnboardingError::Validation(format!(
                "rejection reason must be at most {} characters",
                REASON_MAX_CHARS
            )));
        }

        let session = self
            .ctx
            .store
            .get_session(session_id)
            .await
            .map_err(not_found("session"))?;
        if session.status.is_decided() {
            return Err(OnboardingError::transition(format!(
                "session is already {}",
                session.status
            )));
        }

        let now = self.ctx.now();
        let rejected = self
            .ctx
            .store
            .update_session(&SessionUpdate {
                session_id: session_id.clone(),
                from: vec![
                    SessionStatus::AwaitingProfile,
                    SessionStatus::AwaitingUploads,
                    SessionStatus::UnderReview,
                ],
                to: SessionStatus::Rejected,
                profile: None,
                media: None,
                decision: Some(SessionDecision {
                    decided_by: moderator_id.clone(),
                    decided_at: now,
                    rejection_reason: Some(reason.to_string()),
                    notes: None,
                }),
                at: now,
            })
            .await?
            .ok_or_else(|| OnboardingError::transition("session was decided concurrently"))?;

        tracing::info!(
            session_id = %session_id.0,
            invite_id = %session.invite_id.0,
            moderator_id = %moderator_id.0,
            "session rejected"
        );
        self.ctx
            .record(
                InviteEvent::builder(&session.invite_id, EventKind::SessionRejected)
                    .actor(Some(moderator_id))
                    .details(json!({ "session_id": session_id.0, "reason": reason }))
                    .at(now)
                    .build(),
            )
            .await;
        Ok(rejected)
    }

    /// Decline an invite on policy grounds. Declining twice is a no-op.
    pub async fn decline(&self, invite_id: &InviteId, moderator_id: &UserId) -> Result<Invite> {
        let invite = self.fetch(invite_id).await?;
        match invite.status {
            InviteStatus::Declined => return Ok(invite),
            status if status.is_terminal() => {
                return Err(OnboardingError::transition(format!(
                    "cannot decline an invite in status {}",
                    status
                )))
            }
            _ => {}
        }

        let now = self.ctx.now();
        let declined = self
            .ctx
            .store
            .transition_invite(&InviteTransition {
                invite_id: invite_id.clone(),
                from: InviteStatus::NON_TERMINAL.to_vec(),
                to: InviteStatus::Declined,
                stamp_consumed: true,
                at: now,
            })
            .await?;
        let Some(declined) = declined else {
            let current = self.fetch(invite_id).await?;
            return match current.status {
                InviteStatus::Declined => Ok(current),
                other => Err(OnboardingError::transition(format!(
                    "invite moved to {} before it could be declined",
                    other
                ))),
            };
        };

        tracing::info!(invite_id = %invite_id.0, moderator_id = %moderator_id.0, "invite declined");
        self.ctx
            .record(
                InviteEvent::builder(invite_id, EventKind::Declined)
                    .actor(Some(moderator_id))
                    .details(json!({ "from": invite.status.as_str() }))
                    .at(now)
                    .build(),
            )
            .await;
        Ok(declined)
    }

    async fn fetch(&self, invite_id: &InviteId) -> Result<Invite> {
        self.ctx.invites().current(invite_id).await
    }

    async fn session_for(&self, invite_id: &InviteId) -> Result<Option<VerificationSession>> {
        match self.ctx.store.get_session_for_invite(invite_id).await {
            Ok(session) => Ok(Some(session)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
