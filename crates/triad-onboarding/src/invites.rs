//! Invite lifecycle on the inviter's side: create, list, revoke, verify, confirm.

use chrono::Duration;
use serde_json::json;
use triad_audit::{EventKind, InviteEvent};
use triad_storage::{
    normalize_email, CreateInviteParams, Invite, InviteId, InviteRole, InviteStatus,
    InviteTransition, StoreError, UserId,
};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::not_found;
use crate::{token_owner, InviteEmail, Onboarding, OnboardingError, Result, TokenCheck};

const MAX_EMAIL_LEN: usize = 254;

/// Returned once to the inviter; `invite_url` is the only copy of the token.
pub struct CreatedInvite {
    pub invite_id: InviteId,
    pub invite_url: Zeroizing<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl std::fmt::Debug for CreatedInvite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedInvite")
            .field("invite_id", &self.invite_id)
            .field("invite_url", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct InviteManager<'a> {
    ctx: &'a Onboarding,
}

impl<'a> InviteManager<'a> {
    pub(crate) fn new(ctx: &'a Onboarding) -> Self {
        Self { ctx }
    }

    /// Create an invite for `invitee_email` with the requested role.
    ///
    /// `ttl` defaults to the configured invite TTL.
    pub async fn create_invite(
        &self,
        inviter_id: &UserId,
        invitee_email: &str,
        role: &str,
        ttl: Option<Duration>,
    ) -> Result<CreatedInvite> {
        let role: InviteRole = role.trim().parse().map_err(OnboardingError::Validation)?;
        let email = normalize_email(invitee_email);
        if !is_plausible_email(&email) {
            return Err(OnboardingError::Validation(format!(
                "not an email address: {:?}",
                invitee_email.trim()
            )));
        }
        let ttl = ttl.unwrap_or(self.ctx.settings.invite_ttl);
        if ttl <= Duration::zero() {
            return Err(OnboardingError::Validation(
                "invite lifetime must be positive".into(),
            ));
        }

        if !self.ctx.eligibility.is_inviter_eligible(inviter_id).await? {
            tracing::info!(inviter_id = %inviter_id.0, "ineligible inviter refused");
            return Err(OnboardingError::Ineligible);
        }
        let inviter = self
            .ctx
            .store
            .get_user(inviter_id)
            .await
            .map_err(not_found("inviter"))?;
        if inviter.email == email {
            return Err(OnboardingError::Validation(
                "inviters cannot invite themselves".into(),
            ));
        }

        let now = self.ctx.now();
        let limit = self.ctx.settings.max_active_invites;
        let active = self.ctx.store.count_active_invites(inviter_id, now).await?;
        if active >= limit {
            return Err(OnboardingError::QuotaExceeded { limit });
        }

        let invite_id = InviteId(Uuid::now_v7());
        let token = triad_crypto::issue(&invite_id.0.to_string());
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| OnboardingError::Validation("invite lifetime is too long".into()))?;

        // The insert re-checks the limit atomically; the count above is only a fast path.
        let invite = self
            .ctx
            .store
            .create_invite(&CreateInviteParams {
                id: invite_id.clone(),
                inviter_id: inviter_id.clone(),
                invitee_email: email,
                role,
                token_hash: token.secret_hash.clone(),
                token_salt: token.salt.clone(),
                expires_at,
                active_limit: Some(limit),
                at: now,
            })
            .await
            .map_err(|e| match e {
                StoreError::LimitReached => OnboardingError::QuotaExceeded { limit },
                other => other.into(),
            })?;

        tracing::info!(
            invite_id = %invite.id.0,
            inviter_id = %inviter_id.0,
            role = %role,
            "invite created"
        );
        self.ctx
            .record(
                InviteEvent::builder(&invite.id, EventKind::Created)
                    .actor(Some(inviter_id))
                    .details(json!({ "role": role.as_str(), "expires_at": expires_at }))
                    .at(now)
                    .build(),
            )
            .await;

        let invite_url = Zeroizing::new(self.ctx.link("invite", &token.combined));
        self.ctx
            .notify(
                "invite_email",
                self.ctx.notifier.send_invite_email(InviteEmail {
                    to: invite.invitee_email.clone(),
                    inviter_name: inviter.display_name.clone(),
                    role_label: role.label(),
                    invite_url: invite_url.to_string(),
                    expires_at,
                }),
            )
            .await;

        Ok(CreatedInvite {
            invite_id: invite.id,
            invite_url,
            expires_at,
        })
    }

    /// Every invite the user has sent, newest first, terminal ones included.
    pub async fn list_invites(&self, inviter_id: &UserId) -> Result<Vec<Invite>> {
        Ok(self.ctx.store.list_invites_for_inviter(inviter_id).await?)
    }

    /// Revoke an invite. Revoking an invite that already ended is a no-op.
    pub async fn revoke_invite(&self, invite_id: &InviteId, actor_id: &UserId) -> Result<Invite> {
        let invite = self.fetch(invite_id).await?;
        if invite.inviter_id != *actor_id {
            return Err(OnboardingError::Forbidden("only the inviter can revoke an invite"));
        }
        if invite.status.is_terminal() {
            return Ok(invite);
        }

        let now = self.ctx.now();
        let revoked = self
            .ctx
            .store
            .transition_invite(&InviteTransition {
                invite_id: invite_id.clone(),
                from: InviteStatus::NON_TERMINAL.to_vec(),
                to: InviteStatus::Revoked,
                stamp_consumed: true,
                at: now,
            })
            .await?;
        let Some(revoked) = revoked else {
            // Someone else moved it to a terminal state first.
            return self.fetch(invite_id).await;
        };

        tracing::info!(invite_id = %invite_id.0, actor_id = %actor_id.0, "invite revoked");
        self.ctx
            .record(
                InviteEvent::builder(invite_id, EventKind::Revoked)
                    .actor(Some(actor_id))
                    .details(json!({ "from": invite.status.as_str() }))
                    .at(now)
                    .build(),
            )
            .await;
        Ok(revoked)
    }

    /// Check an invite token presented by the invitee.
    ///
    /// A `pending` or `awaiting_verification` invite past its expiry is moved to
    /// `expired` here.
    pub async fn verify_invite_token(&self, combined: &str) -> Result<TokenCheck<Invite>> {
        let Some(id) = token_owner(combined) else {
            return Ok(TokenCheck::Invalid);
        };
        let invite = match self.ctx.store.get_invite(&InviteId(id)).await {
            Ok(invite) => invite,
            Err(StoreError::NotFound) => return Ok(TokenCheck::Invalid),
            Err(e) => return Err(e.into()),
        };
        if !triad_crypto::verify(combined.trim(), &invite.token_hash, &invite.token_salt) {
            return Ok(TokenCheck::Invalid);
        }

        let invite = self.expire_if_due(invite).await?;
        Ok(match invite.status {
            InviteStatus::Revoked | InviteStatus::Declined => TokenCheck::Invalid,
            InviteStatus::AwaitingCouple | InviteStatus::Completed => TokenCheck::Consumed,
            InviteStatus::Expired => TokenCheck::Expired,
            InviteStatus::Pending
            | InviteStatus::AwaitingVerification
            | InviteStatus::AwaitingActivation => TokenCheck::Valid(invite),
        })
    }

    /// The inviter confirms the activated single: `awaiting_couple -> completed`.
    pub async fn confirm_link(&self, invite_id: &InviteId, actor_id: &UserId) -> Result<Invite> {
        let invite = self.fetch(invite_id).await?;
        if invite.inviter_id != *actor_id {
            return Err(OnboardingError::Forbidden("only the inviter can confirm an invite"));
        }
        match invite.status {
            InviteStatus::Completed => return Ok(invite),
            InviteStatus::AwaitingCouple => {}
            other => {
                return Err(OnboardingError::transition(format!(
                    "cannot confirm an invite in status {}",
                    other
                )))
            }
        }

        let now = self.ctx.now();
        let completed = self
            .ctx
            .store
            .transition_invite(&InviteTransition {
                invite_id: invite_id.clone(),
                from: vec![InviteStatus::AwaitingCouple],
                to: InviteStatus::Completed,
                stamp_consumed: true,
                at: now,
            })
            .await?;
        let Some(completed) = completed else {
            let current = self.fetch(invite_id).await?;
            return match current.status {
                InviteStatus::Completed => Ok(current),
                other => Err(OnboardingError::transition(format!(
                    "invite moved to {} before it could be confirmed",
                    other
                ))),
            };
        };

        tracing::info!(invite_id = %invite_id.0, "invite completed");
        self.ctx
            .record(
                InviteEvent::builder(invite_id, EventKind::Completed)
                    .actor(Some(actor_id))
                    .details(json!({
                        "invitee_user_id": completed.invitee_user_id.as_ref().map(|u| u.0),
                    }))
                    .at(now)
                    .build(),
            )
            .await;
        Ok(completed)
    }

    async fn fetch(&self, invite_id: &InviteId) -> Result<Invite> {
        self.ctx
            .store
            .get_invite(invite_id)
            .await
            .map_err(not_found("invite"))
    }

    /// Load an invite with wall-clock expiry applied, the same way a token check
    /// applies it.
    pub(crate) async fn current(&self, invite_id: &InviteId) -> Result<Invite> {
        let invite = self.fetch(invite_id).await?;
        self.expire_if_due(invite).await
    }

    /// Invites that have not reached approval expire at `expires_at`; after that
    /// the activation token's own expiry governs.
    async fn expire_if_due(&self, invite: Invite) -> Result<Invite> {
        let now = self.ctx.now();
        let due = matches!(
            invite.status,
            InviteStatus::Pending | InviteStatus::AwaitingVerification
        ) && now >= invite.expires_at;
        if !due {
            return Ok(invite);
        }
        match self.expire(&invite, now).await? {
            Some(expired) => Ok(expired),
            None => self.fetch(&invite.id).await,
        }
    }

    async fn expire(
        &self,
        invite: &Invite,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Invite>> {
        let expired = self
            .ctx
            .store
            .transition_invite(&InviteTransition {
                invite_id: invite.id.clone(),
                from: vec![InviteStatus::Pending, InviteStatus::AwaitingVerification],
                to: InviteStatus::Expired,
                stamp_consumed: false,
                at: now,
            })
            .await?;
        if expired.is_some() {
            tracing::info!(invite_id = %invite.id.0, "invite expired");
            self.ctx
                .record(
                    InviteEvent::builder(&invite.id, EventKind::Expired)
                        .details(json!({ "expires_at": invite.expires_at }))
                        .at(now)
                        .build(),
                )
                .await;
        }
        Ok(expired)
    }
}

/// One `@`, a non-empty local part and a dotted domain, no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}
