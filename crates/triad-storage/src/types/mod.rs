//! Type definitions for triad storage.

mod activations;
mod ids;
mod invites;
mod profiles;
mod users;
mod verification;

// Re-export all types from submodules
pub use activations::*;
pub use ids::*;
pub use invites::*;
pub use profiles::*;
pub use users::*;
pub use verification::*;
