//! Activation: the approved single redeems the activation token and sets a password.

use serde_json::json;
use triad_audit::{EventKind, InviteEvent};
use triad_storage::{
    ActivationId, Invite, InviteStatus, RedeemActivationParams, RedeemOutcome, SingleProfile,
    StoreError, User,
};

use crate::{token_owner, NewMemberDetails, Onboarding, OnboardingError, Result, TokenCheck};

const PASSWORD_CHARS: std::ops::RangeInclusive<usize> = 10..=256;

/// A verified, still redeemable activation token.
#[derive(Clone, Debug)]
pub struct ActivationGrant {
    pub invite: Invite,
    pub activation_id: ActivationId,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug)]
pub struct ActivatedMember {
    pub user: User,
    pub invite: Invite,
    pub profile: SingleProfile,
    /// `false` when an existing single account was linked instead.
    pub account_created: bool,
    /// `false` when the linked account already had a password and kept it.
    pub password_set: bool,
}

#[derive(Clone, Debug)]
pub enum ActivationOutcome {
    Activated(Box<ActivatedMember>),
    /// The token did not verify; the check says why.
    Rejected(TokenCheck<()>),
}

pub struct ActivationManager<'a> {
    ctx: &'a Onboarding,
}

impl<'a> ActivationManager<'a> {
    pub(crate) fn new(ctx: &'a Onboarding) -> Self {
        Self { ctx }
    }

    pub async fn verify_activation_token(
        &self,
        combined: &str,
    ) -> Result<TokenCheck<ActivationGrant>> {
        let Some(id) = token_owner(combined) else {
            return Ok(TokenCheck::Invalid);
        };
        let activation_id = ActivationId(id);
        let token = match self.ctx.store.get_activation(&activation_id).await {
            Ok(token) => token,
            Err(StoreError::NotFound) => return Ok(TokenCheck::Invalid),
            Err(e) => return Err(e.into()),
        };
        if !triad_crypto::verify(combined.trim(), &token.token_hash, &token.token_salt) {
            return Ok(TokenCheck::Invalid);
        }
        if token.consumed_at.is_some() {
            return Ok(TokenCheck::Consumed);
        }
        if self.ctx.now() >= token.expires_at {
            return Ok(TokenCheck::Expired);
        }

        let invite = match self.ctx.store.get_invite(&token.invite_id).await {
            Ok(invite) => invite,
            Err(StoreError::NotFound) => return Ok(TokenCheck::Invalid),
            Err(e) => return Err(e.into()),
        };
        Ok(match invite.status {
            InviteStatus::AwaitingActivation => TokenCheck::Valid(ActivationGrant {
                invite,
                activation_id,
                expires_at: token.expires_at,
            }),
            InviteStatus::AwaitingCouple | InviteStatus::Completed => TokenCheck::Consumed,
            _ => TokenCheck::Invalid,
        })
    }

    /// Redeem an activation token and set the member's password.
    ///
    /// Of several concurrent redemptions exactly one activates; the others see
    /// `Rejected(Consumed)`.
    pub async fn complete_activation(
        &self,
        combined: &str,
        password: &str,
    ) -> Result<ActivationOutcome> {
        let grant = match self.verify_activation_token(combined).await? {
            TokenCheck::Valid(grant) => grant,
            other => return Ok(ActivationOutcome::Rejected(other.map(|_| ()))),
        };

        let length = password.chars().count();
        if !PASSWORD_CHARS.contains(&length) {
            return Err(OnboardingError::Validation(format!(
                "password must be {} to {} characters",
                PASSWORD_CHARS.start(),
                PASSWORD_CHARS.end()
            )));
        }
        let password_hash = triad_crypto::hash_password(password)?;

        let now = self.ctx.now();
        let outcome = self
            .ctx
            .store
            .redeem_activation(&RedeemActivationParams {
                activation_id: grant.activation_id.clone(),
                password_hash,
                at: now,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict => OnboardingError::Conflict(
                    "the invitee email belongs to a couple account".into(),
                ),
                other => other.into(),
            })?;

        let redemption = match outcome {
            RedeemOutcome::Redeemed(redemption) => redemption,
            RedeemOutcome::Consumed => {
                return Ok(ActivationOutcome::Rejected(TokenCheck::Consumed))
            }
            RedeemOutcome::Expired => return Ok(ActivationOutcome::Rejected(TokenCheck::Expired)),
            RedeemOutcome::InviteClosed => {
                return Ok(ActivationOutcome::Rejected(TokenCheck::Invalid))
            }
        };
        let invite_id = redemption.invite.id.clone();
        let user_id = redemption.user.id.clone();

        tracing::info!(
            invite_id = %invite_id.0,
            user_id = %user_id.0,
            account_created = redemption.account_created,
            "activation completed"
        );
        self.ctx
            .record(
                InviteEvent::builder(&invite_id, EventKind::UserLinked)
                    .actor(Some(&user_id))
                    .details(json!({
                        "user_id": user_id.0,
                        "account_created": redemption.account_created,
                    }))
                    .at(now)
                    .build(),
            )
            .await;
        self.ctx
            .record(
                InviteEvent::builder(&invite_id, EventKind::ActivationCompleted)
                    .actor(Some(&user_id))
                    .details(json!({ "activation_id": grant.activation_id.0 }))
                    .at(now)
                    .build(),
            )
            .await;

        self.ctx
            .notify(
                "admin_new_member",
                self.ctx.notifier.notify_admin_new_member(NewMemberDetails {
                    user_id: user_id.clone(),
                    invite_id: invite_id.clone(),
                    inviter_id: redemption.invite.inviter_id.clone(),
                    email: redemption.user.email.clone(),
                    nickname: redemption.profile.nickname.clone(),
                    account_created: redemption.account_created,
                }),
            )
            .await;

        Ok(ActivationOutcome::Activated(Box::new(ActivatedMember {
            user: redemption.user,
            invite: redemption.invite,
            profile: redemption.profile,
            account_created: redemption.account_created,
            password_set: redemption.password_set,
        })))
    }
}
