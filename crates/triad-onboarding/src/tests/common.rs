//! Shared test helpers: a manual clock, a recording notifier and a harness wired
//! to an in-memory SQLite store.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use triad_audit::{EventKind, EventLog, EventLogError, EventLogFilter, InviteEvent};
use triad_storage::{
    CreateUserParams, InviteId, MediaKind, MediaRef, ProfileSubmission, Store, User, UserId,
    UserKind,
};
use triad_store_sqlite::SqliteStore;

use crate::{
    ActivationEmail, Clock, InviteEmail, NewMemberDetails, Notifier, NotifyError, Onboarding,
    OnboardingSettings, StoreEligibility, TokenCheck,
};

pub const PASSWORD: &str = "correct horse battery";

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Event log that drops everything.
pub struct NullEventLog;

#[async_trait]
impl EventLog for NullEventLog {
    async fn append(&self, _event: InviteEvent) -> Result<(), EventLogError> {
        Ok(())
    }

    async fn list_for_invite(
        &self,
        _invite_id: &InviteId,
    ) -> Result<Vec<InviteEvent>, EventLogError> {
        Ok(vec![])
    }

    async fn query(&self, _filter: EventLogFilter) -> Result<Vec<InviteEvent>, EventLogError> {
        Ok(vec![])
    }

    async fn count(&self, _filter: EventLogFilter) -> Result<u64, EventLogError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub invites: Mutex<Vec<InviteEmail>>,
    pub activations: Mutex<Vec<ActivationEmail>>,
    pub new_members: Mutex<Vec<NewMemberDetails>>,
}

impl RecordingNotifier {
    pub fn invite_count(&self) -> usize {
        self.invites.lock().unwrap().len()
    }

    pub fn last_activation(&self) -> Option<ActivationEmail> {
        self.activations.lock().unwrap().last().cloned()
    }

    pub fn new_member_count(&self) -> usize {
        self.new_members.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_invite_email(&self, email: InviteEmail) -> Result<(), NotifyError> {
        self.invites.lock().unwrap().push(email);
        Ok(())
    }

    async fn send_activation_email(&self, email: ActivationEmail) -> Result<(), NotifyError> {
        self.activations.lock().unwrap().push(email);
        Ok(())
    }

    async fn notify_admin_new_member(
        &self,
        details: NewMemberDetails,
    ) -> Result<(), NotifyError> {
        self.new_members.lock().unwrap().push(details);
        Ok(())
    }
}

/// The token carried by an invite or activation link.
pub fn token_of(link: &str) -> String {
    link.split_once("token=").unwrap().1.to_string()
}

pub fn test_settings() -> OnboardingSettings {
    OnboardingSettings {
        public_base_url: "https://triad.test".to_string(),
        invite_ttl: Duration::days(7),
        activation_ttl: Duration::hours(48),
        max_active_invites: 3,
        notify_timeout: StdDuration::from_millis(200),
    }
}

pub struct Harness {
    pub ctx: Onboarding,
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_notifier(None).await
    }

    /// Harness whose notifications go to `notifier` instead of the recorder.
    pub async fn with_notifier(notifier: Option<Arc<dyn Notifier>>) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let recorder = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let eligibility = Arc::new(StoreEligibility::new(store.clone(), clock.clone()));
        let ctx = Onboarding::new(
            store.clone(),
            store.clone(),
            notifier.unwrap_or_else(|| recorder.clone() as Arc<dyn Notifier>),
            eligibility,
            test_settings(),
        )
        .with_clock(clock.clone());
        Self {
            ctx,
            store,
            notifier: recorder,
            clock,
        }
    }

    pub async fn user(&self, email: &str, kind: UserKind) -> User {
        self.store
            .create_user(&CreateUserParams {
                email: email.to_string(),
                kind,
                display_name: email.split('@').next().unwrap().to_string(),
                password_hash: None,
                identity_verified: true,
                membership_expires_at: Some(Utc::now() + Duration::days(365)),
            })
            .await
            .unwrap()
    }

    pub async fn couple(&self, email: &str) -> User {
        self.user(email, UserKind::Couple).await
    }

    /// Create an invite and return its id and token.
    pub async fn invite(&self, inviter: &User, email: &str) -> (InviteId, String) {
        let created = self
            .ctx
            .invites()
            .create_invite(&inviter.id, email, "single_female", None)
            .await
            .unwrap();
        (created.invite_id, token_of(&created.invite_url))
    }

    /// Walk an invite through verification up to `under_review`.
    pub async fn submit_for_review(&self, invite_token: &str, nickname: &str) {
        let TokenCheck::Valid(session) = self.ctx.intake().open_session(invite_token).await.unwrap()
        else {
            panic!("invite token should be valid");
        };
        self.ctx
            .intake()
            .submit_profile(
                &session.id,
                ProfileSubmission {
                    nickname: nickname.to_string(),
                    city: Some("Lisbon".to_string()),
                    short_bio: Some("Enjoys long dinners.".to_string()),
                    ..ProfileSubmission::default()
                },
            )
            .await
            .unwrap();
        self.ctx
            .intake()
            .submit_media(
                &session.id,
                vec![
                    MediaRef {
                        blob_ref: "blob://selfie".to_string(),
                        kind: MediaKind::Photo,
                        caption: None,
                    },
                    MediaRef {
                        blob_ref: "blob://id-check".to_string(),
                        kind: MediaKind::Video,
                        caption: Some("liveness".to_string()),
                    },
                ],
            )
            .await
            .unwrap();
    }

    /// Approve an invite and return the activation token.
    pub async fn approve(&self, invite_id: &InviteId, moderator: &UserId) -> String {
        let notice = self
            .ctx
            .moderation()
            .approve(invite_id, moderator)
            .await
            .unwrap();
        token_of(&notice.activation_link)
    }

    pub async fn event_kinds(&self, invite_id: &InviteId) -> Vec<EventKind> {
        self.store
            .list_for_invite(invite_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    pub async fn count_events(&self, invite_id: &InviteId, kind: EventKind) -> u64 {
        self.store
            .count(EventLogFilter::new().invite_id(invite_id.clone()).kind(kind))
            .await
            .unwrap()
    }
}
