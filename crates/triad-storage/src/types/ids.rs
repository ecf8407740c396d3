//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// User (couple or single account) identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Invite identifier. Also the public half of an invite token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InviteId(pub Uuid);

/// Activation token identifier. Also the public half of an activation token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActivationId(pub Uuid);

/// Verification session identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

/// Review identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReviewId(pub Uuid);
