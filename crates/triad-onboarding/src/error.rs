use thiserror::Error;
use triad_crypto::PasswordHashError;
use triad_storage::StoreError;

/// Errors returned by the onboarding services.
#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("inviter is not eligible to send invites")]
    Ineligible,
    #[error("active invite limit of {limit} reached")]
    QuotaExceeded { limit: u32 },
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("store temporarily unavailable: {0}")]
    TransientStore(String),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("crypto error: {0}")]
    Crypto(#[from] PasswordHashError),
}

/// Coarse error class, for mapping onto user-facing statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    Unavailable,
    Internal,
}

impl OnboardingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OnboardingError::Validation(_) => ErrorClass::BadRequest,
            OnboardingError::Ineligible | OnboardingError::Forbidden(_) => ErrorClass::Forbidden,
            OnboardingError::NotFound(_) => ErrorClass::NotFound,
            OnboardingError::Conflict(_)
            | OnboardingError::Duplicate(_)
            | OnboardingError::InvalidTransition(_) => ErrorClass::Conflict,
            OnboardingError::QuotaExceeded { .. } => ErrorClass::TooManyRequests,
            OnboardingError::TransientStore(_) => ErrorClass::Unavailable,
            OnboardingError::Store(_) | OnboardingError::Crypto(_) => ErrorClass::Internal,
        }
    }

    pub(crate) fn transition(what: impl std::fmt::Display) -> Self {
        OnboardingError::InvalidTransition(what.to_string())
    }
}

impl From<StoreError> for OnboardingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Transient(msg) => OnboardingError::TransientStore(msg),
            StoreError::NotFound => OnboardingError::NotFound("record"),
            other => OnboardingError::Store(other),
        }
    }
}

/// Map `StoreError::NotFound` to a named entity; everything else as usual.
pub(crate) fn not_found(what: &'static str) -> impl FnOnce(StoreError) -> OnboardingError {
    move |e| match e {
        StoreError::NotFound => OnboardingError::NotFound(what),
        other => other.into(),
    }
}
