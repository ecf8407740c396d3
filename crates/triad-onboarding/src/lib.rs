//! Single-member onboarding for triad.
//!
//! A couple invites a single; the single opens a verification session with the
//! invite token, submits a profile and media, a moderator approves or rejects, and
//! an approved single redeems an activation token to create credentials. The
//! inviter finally confirms the link.
//!
//! All durable state lives behind [`Store`] and [`EventLog`]. The services here
//! are stateless and cheap to construct from an [`Onboarding`] context.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use triad_audit::{EventLog, InviteEvent};
use triad_config::OnboardingConfig;
use triad_storage::Store;

mod activation;
mod collaborators;
mod error;
mod intake;
mod invites;
mod moderation;
mod reviews;

#[cfg(test)]
mod tests;

pub use activation::{ActivatedMember, ActivationGrant, ActivationManager, ActivationOutcome};
pub use collaborators::{
    ActivationEmail, EligibilityService, InviteEmail, LogNotifier, NewMemberDetails,
    Notifier, NotifyError, StoreEligibility,
};
pub use error::{ErrorClass, OnboardingError};
pub use intake::VerificationIntake;
pub use invites::{CreatedInvite, InviteManager};
pub use moderation::{ApprovalNotice, ModerationGate};
pub use reviews::ReviewService;

pub type Result<T> = std::result::Result<T, OnboardingError>;

/// Outcome of checking a bearer token.
///
/// Only `Valid` carries data; the other variants deliberately say nothing about
/// which check failed.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenCheck<T> {
    Valid(T),
    Expired,
    Consumed,
    Invalid,
}

impl<T> TokenCheck<T> {
    /// Message suitable for showing to the bearer.
    pub fn message(&self) -> &'static str {
        match self {
            TokenCheck::Valid(_) => "This link is valid.",
            TokenCheck::Expired => "This link has expired. Ask for a new one.",
            TokenCheck::Consumed => "This link has already been used.",
            TokenCheck::Invalid => "This link is not valid.",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenCheck::Valid(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TokenCheck<U> {
        match self {
            TokenCheck::Valid(v) => TokenCheck::Valid(f(v)),
            TokenCheck::Expired => TokenCheck::Expired,
            TokenCheck::Consumed => TokenCheck::Consumed,
            TokenCheck::Invalid => TokenCheck::Invalid,
        }
    }
}

/// The id half of a `"<uuid>.<secret>"` token, if the token is well formed.
pub(crate) fn token_owner(combined: &str) -> Option<uuid::Uuid> {
    let token = triad_crypto::SplitToken::parse(combined.trim())?;
    uuid::Uuid::try_parse(token.id).ok()
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Workflow knobs, derived from [`OnboardingConfig`].
#[derive(Clone, Debug)]
pub struct OnboardingSettings {
    /// Links are built as `{public_base_url}/invite?token=..` and `/activate?token=..`.
    pub public_base_url: String,
    pub invite_ttl: chrono::Duration,
    pub activation_ttl: chrono::Duration,
    pub max_active_invites: u32,
    pub notify_timeout: std::time::Duration,
}

impl From<&OnboardingConfig> for OnboardingSettings {
    fn from(config: &OnboardingConfig) -> Self {
        Self {
            public_base_url: config.public_base_url.trim().trim_end_matches('/').to_string(),
            invite_ttl: ttl_hours(config.invite_ttl_hours),
            activation_ttl: ttl_hours(config.activation_ttl_hours),
            max_active_invites: config.max_active_invites,
            notify_timeout: config.notify_timeout(),
        }
    }
}

// Out-of-range hours saturate; adding them to a timestamp then fails validation.
fn ttl_hours(hours: i64) -> chrono::Duration {
    chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self::from(&OnboardingConfig::default())
    }
}

/// Shared handles for the onboarding services.
#[derive(Clone)]
pub struct Onboarding {
    store: Arc<dyn Store>,
    events: Arc<dyn EventLog>,
    notifier: Arc<dyn Notifier>,
    eligibility: Arc<dyn EligibilityService>,
    clock: Arc<dyn Clock>,
    settings: Arc<OnboardingSettings>,
}

impl Onboarding {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventLog>,
        notifier: Arc<dyn Notifier>,
        eligibility: Arc<dyn EligibilityService>,
        settings: OnboardingSettings,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            eligibility,
            clock: Arc::new(SystemClock),
            settings: Arc::new(settings),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OnboardingSettings {
        &self.settings
    }

    pub fn invites(&self) -> InviteManager<'_> {
        InviteManager::new(self)
    }

    pub fn intake(&self) -> VerificationIntake<'_> {
        VerificationIntake::new(self)
    }

    pub fn moderation(&self) -> ModerationGate<'_> {
        ModerationGate::new(self)
    }

    pub fn activation(&self) -> ActivationManager<'_> {
        ActivationManager::new(self)
    }

    pub fn reviews(&self) -> ReviewService<'_> {
        ReviewService::new(self)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn link(&self, path: &str, token: &str) -> String {
        format!("{}/{}?token={}", self.settings.public_base_url, path, token)
    }

    /// Append an event. The workflow step has already happened, so a failure is
    /// only logged.
    pub(crate) async fn record(&self, event: InviteEvent) {
        let invite_id = event.invite_id;
        let kind = event.kind;
        if let Err(e) = self.events.append(event).await {
            tracing::warn!(invite_id = %invite_id, kind = %kind, error = %e, "failed to append invite event");
        }
    }

    /// Run a notifier call under the notify timeout; failures are logged.
    pub(crate) async fn notify<F>(&self, what: &'static str, call: F)
    where
        F: Future<Output = std::result::Result<(), NotifyError>>,
    {
        match tokio::time::timeout(self.settings.notify_timeout, call).await {
            Ok(Ok(())) => tracing::debug!(notification = what, "notification delivered"),
            Ok(Err(e)) => tracing::warn!(notification = what, error = %e, "notification failed"),
            Err(_) => tracing::warn!(
                notification = what,
                timeout_ms = self.settings.notify_timeout.as_millis() as u64,
                "notification timed out"
            ),
        }
    }
}

#[cfg(test)]
mod token_check_tests {
    use super::*;

    #[test]
    fn messages_are_distinct() {
        let messages = [
            TokenCheck::Valid(()).message(),
            TokenCheck::<()>::Expired.message(),
            TokenCheck::<()>::Consumed.message(),
            TokenCheck::<()>::Invalid.message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn map_keeps_failure_variants() {
        assert_eq!(TokenCheck::Valid(2).map(|v| v * 2), TokenCheck::Valid(4));
        assert_eq!(TokenCheck::<u8>::Expired.map(|_| ()), TokenCheck::Expired);
        assert!(!TokenCheck::<u8>::Invalid.is_valid());
    }

    #[test]
    fn settings_from_config() {
        let config = OnboardingConfig {
            public_base_url: "https://triad.example/ ".to_string(),
            invite_ttl_hours: 24,
            ..OnboardingConfig::default()
        };
        let settings = OnboardingSettings::from(&config);
        assert_eq!(settings.public_base_url, "https://triad.example");
        assert_eq!(settings.invite_ttl, chrono::Duration::hours(24));
        assert_eq!(settings.max_active_invites, 3);
    }

    #[test]
    fn settings_from_out_of_range_hours_do_not_panic() {
        let config = OnboardingConfig {
            invite_ttl_hours: i64::MAX,
            activation_ttl_hours: i64::MAX / 2,
            ..OnboardingConfig::default()
        };
        let settings = OnboardingSettings::from(&config);
        assert_eq!(settings.invite_ttl, chrono::Duration::MAX);
        assert!(Utc::now()
            .checked_add_signed(settings.activation_ttl)
            .is_none());
    }
}
