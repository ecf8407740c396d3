//! Invitee side of verification: open a session with the invite token, then
//! submit a profile and media for review.

use serde_json::json;
use triad_audit::{EventKind, InviteEvent};
use triad_storage::{
    InviteStatus, InviteTransition, MediaRef, OpenSessionParams, ProfileSubmission, SessionId,
    SessionStatus, SessionUpdate, VerificationSession,
};
use uuid::Uuid;

use crate::error::not_found;
use crate::{Onboarding, OnboardingError, Result, TokenCheck};

const NICKNAME_CHARS: std::ops::RangeInclusive<usize> = 2..=40;
const PLACE_MAX_CHARS: usize = 80;
const FREE_TEXT_MAX_CHARS: usize = 2000;
const MAX_MEDIA: usize = 12;
const BLOB_REF_MAX_CHARS: usize = 512;
const CAPTION_MAX_CHARS: usize = 200;

pub struct VerificationIntake<'a> {
    ctx: &'a Onboarding,
}

impl<'a> VerificationIntake<'a> {
    pub(crate) fn new(ctx: &'a Onboarding) -> Self {
        Self { ctx }
    }

    /// Open (or reopen) the verification session for the invite behind `combined`.
    pub async fn open_session(&self, combined: &str) -> Result<TokenCheck<VerificationSession>> {
        let invite = match self.ctx.invites().verify_invite_token(combined).await? {
            TokenCheck::Valid(invite) => invite,
            TokenCheck::Expired => return Ok(TokenCheck::Expired),
            TokenCheck::Consumed => return Ok(TokenCheck::Consumed),
            TokenCheck::Invalid => return Ok(TokenCheck::Invalid),
        };

        let now = self.ctx.now();
        let (session, created) = self
            .ctx
            .store
            .open_session(&OpenSessionParams {
                id: SessionId(Uuid::now_v7()),
                invite_id: invite.id.clone(),
                invitee_email: invite.invitee_email.clone(),
                at: now,
            })
            .await?;

        if invite.status == InviteStatus::Pending {
            self.ctx
                .store
                .transition_invite(&InviteTransition {
                    invite_id: invite.id.clone(),
                    from: vec![InviteStatus::Pending],
                    to: InviteStatus::AwaitingVerification,
                    stamp_consumed: false,
                    at: now,
                })
                .await?;
        }

        if created {
            tracing::info!(invite_id = %invite.id.0, session_id = %session.id.0, "verification session opened");
            self.ctx
                .record(
                    InviteEvent::builder(&invite.id, EventKind::SessionOpened)
                        .details(json!({ "session_id": session.id.0 }))
                        .at(now)
                        .build(),
                )
                .await;
        }
        Ok(TokenCheck::Valid(session))
    }

    /// Submit or resubmit the profile; the session moves to `awaiting_uploads`.
    pub async fn submit_profile(
        &self,
        session_id: &SessionId,
        submission: ProfileSubmission,
    ) -> Result<VerificationSession> {
        let profile = sanitize_profile(submission);
        validate_profile(&profile)?;

        let session = self.open_for_changes(session_id).await?;
        if !matches!(
            session.status,
            SessionStatus::AwaitingProfile | SessionStatus::AwaitingUploads
        ) {
            return Err(OnboardingError::transition(format!(
                "cannot submit a profile while the session is {}",
                session.status
            )));
        }

        let updated = self
            .ctx
            .store
            .update_session(&SessionUpdate {
                session_id: session_id.clone(),
                from: vec![SessionStatus::AwaitingProfile, SessionStatus::AwaitingUploads],
                to: SessionStatus::AwaitingUploads,
                profile: Some(profile),
                media: None,
                decision: None,
                at: self.ctx.now(),
            })
            .await?
            .ok_or_else(|| OnboardingError::transition("session changed while saving the profile"))?;
        tracing::debug!(session_id = %session_id.0, "profile submitted");
        Ok(updated)
    }

    /// Attach media references; the session moves to `under_review`.
    pub async fn submit_media(
        &self,
        session_id: &SessionId,
        media: Vec<MediaRef>,
    ) -> Result<VerificationSession> {
        let media = sanitize_media(media)?;

        let session = self.open_for_changes(session_id).await?;
        if session.status != SessionStatus::AwaitingUploads {
            return Err(OnboardingError::transition(format!(
                "cannot submit media while the session is {}",
                session.status
            )));
        }

        let count = media.len();
        let updated = self
            .ctx
            .store
            .update_session(&SessionUpdate {
                session_id: session_id.clone(),
                from: vec![SessionStatus::AwaitingUploads],
                to: SessionStatus::UnderReview,
                profile: None,
                media: Some(media),
                decision: None,
                at: self.ctx.now(),
            })
            .await?
            .ok_or_else(|| OnboardingError::transition("session changed while saving media"))?;
        tracing::info!(session_id = %session_id.0, media = count, "session submitted for review");
        Ok(updated)
    }

    /// Load a session whose invite is still open.
    async fn open_for_changes(&self, session_id: &SessionId) -> Result<VerificationSession> {
        let session = self
            .ctx
            .store
            .get_session(session_id)
            .await
            .map_err(not_found("session"))?;
        let invite = self.ctx.invites().current(&session.invite_id).await?;
        if invite.status.is_terminal() {
            return Err(OnboardingError::transition(format!(
                "invite is {}",
                invite.status
            )));
        }
        Ok(session)
    }
}

/// Trim, strip control characters and turn blank optionals into `None`.
/// Newlines survive in free text.
pub(crate) fn sanitize_profile(p: ProfileSubmission) -> ProfileSubmission {
    ProfileSubmission {
        nickname: clean_line(&p.nickname),
        country: p.country.as_deref().map(clean_line).filter(|s| !s.is_empty()),
        city: p.city.as_deref().map(clean_line).filter(|s| !s.is_empty()),
        short_bio: clean_text(p.short_bio.as_deref()),
        interests: clean_text(p.interests.as_deref()),
        play_preferences: clean_text(p.play_preferences.as_deref()),
        boundaries: clean_text(p.boundaries.as_deref()),
        availability: p.availability.map(|mut a| {
            a.days.sort_by_key(|d| d.num_days_from_monday());
            a.days.dedup();
            a.notes = clean_text(a.notes.as_deref());
            a
        }),
    }
}

fn clean_line(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

fn clean_text(s: Option<&str>) -> Option<String> {
    let cleaned: String = s?
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

pub(crate) fn validate_profile(p: &ProfileSubmission) -> Result<()> {
    let nickname = p.nickname.chars().count();
    if !NICKNAME_CHARS.contains(&nickname) {
        return Err(OnboardingError::Validation(format!(
            "nickname must be {} to {} characters",
            NICKNAME_CHARS.start(),
            NICKNAME_CHARS.end()
        )));
    }
    for (field, value) in [("country", &p.country), ("city", &p.city)] {
        check_len(field, value.as_deref(), PLACE_MAX_CHARS)?;
    }
    for (field, value) in [
        ("short_bio", &p.short_bio),
        ("interests", &p.interests),
        ("play_preferences", &p.play_preferences),
        ("boundaries", &p.boundaries),
    ] {
        check_len(field, value.as_deref(), FREE_TEXT_MAX_CHARS)?;
    }
    if let Some(availability) = &p.availability {
        check_len(
            "availability.notes",
            availability.notes.as_deref(),
            FREE_TEXT_MAX_CHARS,
        )?;
    }
    Ok(())
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(OnboardingError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn sanitize_media(media: Vec<MediaRef>) -> Result<Vec<MediaRef>> {
    if media.is_empty() || media.len() > MAX_MEDIA {
        return Err(OnboardingError::Validation(format!(
            "between 1 and {} media items are required",
            MAX_MEDIA
        )));
    }
    media
        .into_iter()
        .map(|m| {
            let blob_ref = clean_line(&m.blob_ref);
            if blob_ref.is_empty() {
                return Err(OnboardingError::Validation("empty media reference".into()));
            }
            check_len("blob_ref", Some(blob_ref.as_str()), BLOB_REF_MAX_CHARS)?;
            let caption = m.caption.as_deref().map(clean_line).filter(|s| !s.is_empty());
            check_len("caption", caption.as_deref(), CAPTION_MAX_CHARS)?;
            Ok(MediaRef {
                blob_ref,
                kind: m.kind,
                caption,
            })
        })
        .collect()
}
