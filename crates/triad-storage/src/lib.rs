//! Storage abstraction for triad.
//!
//! Backend crates (e.g., triad-store-sqlite) implement this trait so
//! `triad-onboarding` doesn't depend on any specific database engine or schema details.

use thiserror::Error;

mod store;
pub mod types;

pub use store::*;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    /// A guarded insert was refused because a count limit was reached.
    #[error("limit reached")]
    LimitReached,
    /// A transient failure that persisted through every retry attempt.
    #[error("store unavailable: {0}")]
    Transient(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
