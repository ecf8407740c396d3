//! Invite event log abstraction for triad.
//!
//! This crate defines the `EventLog` trait for persisting the append-only history
//! of an invite and the types describing each recorded step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use triad_storage::{InviteId, UserId};
use uuid::Uuid;

/// Unique identifier for an event log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLogId(pub Uuid);

impl EventLogId {
    /// Generate a new event ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EventLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Steps recorded in an invite's history
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    SessionOpened,
    Approved,
    SessionRejected,
    Declined,
    Revoked,
    Expired,
    UserLinked,
    ActivationCompleted,
    Completed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Created,
        EventKind::SessionOpened,
        EventKind::Approved,
        EventKind::SessionRejected,
        EventKind::Declined,
        EventKind::Revoked,
        EventKind::Expired,
        EventKind::UserLinked,
        EventKind::ActivationCompleted,
        EventKind::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::SessionOpened => "session_opened",
            EventKind::Approved => "approved",
            EventKind::SessionRejected => "session_rejected",
            EventKind::Declined => "declined",
            EventKind::Revoked => "revoked",
            EventKind::Expired => "expired",
            EventKind::UserLinked => "user_linked",
            EventKind::ActivationCompleted => "activation_completed",
            EventKind::Completed => "completed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event kind: {}", s))
    }
}

/// A single entry in an invite's history.
///
/// Uses raw UUIDs for serialization compatibility. Use the builder
/// to construct events from typed IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InviteEvent {
    pub id: EventLogId,
    pub invite_id: Uuid,
    pub kind: EventKind,
    /// User who caused the step (None for the invitee acting through a token)
    pub actor_user_id: Option<Uuid>,
    /// Additional context as JSON; never token or password material
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl InviteEvent {
    pub fn builder(invite_id: &InviteId, kind: EventKind) -> InviteEventBuilder {
        InviteEventBuilder::new(invite_id, kind)
    }

    pub fn get_invite_id(&self) -> InviteId {
        InviteId(self.invite_id)
    }

    pub fn get_actor_user_id(&self) -> Option<UserId> {
        self.actor_user_id.map(UserId)
    }
}

/// Builder for constructing invite events
pub struct InviteEventBuilder {
    invite_id: Uuid,
    kind: EventKind,
    actor_user_id: Option<Uuid>,
    details: Option<serde_json::Value>,
    at: Option<DateTime<Utc>>,
}

impl InviteEventBuilder {
    pub fn new(invite_id: &InviteId, kind: EventKind) -> Self {
        Self {
            invite_id: invite_id.0,
            kind,
            actor_user_id: None,
            details: None,
            at: None,
        }
    }

    pub fn actor(mut self, actor: Option<&UserId>) -> Self {
        self.actor_user_id = actor.map(|u| u.0);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the event timestamp (defaults to now).
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn build(self) -> InviteEvent {
        InviteEvent {
            id: EventLogId::new(),
            invite_id: self.invite_id,
            kind: self.kind,
            actor_user_id: self.actor_user_id,
            details: self.details,
            created_at: self.at.unwrap_or_else(Utc::now),
        }
    }
}

/// Filter for querying the event log
#[derive(Clone, Debug, Default)]
pub struct EventLogFilter {
    pub invite_id: Option<InviteId>,
    pub actor_user_id: Option<UserId>,
    pub kind: Option<EventKind>,
    /// Inclusive
    pub from: Option<DateTime<Utc>>,
    /// Exclusive
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invite_id(mut self, invite_id: InviteId) -> Self {
        self.invite_id = Some(invite_id);
        self
    }

    pub fn actor_user_id(mut self, actor_user_id: UserId) -> Self {
        self.actor_user_id = Some(actor_user_id);
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Error type for event log operations
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("database error: {0}")]
    Database(String),

    #[error("invalid event kind: {0}")]
    InvalidKind(String),
}

/// Trait for event log persistence.
///
/// Entries are never updated or deleted.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event.
    ///
    /// Called after the state change it describes has committed. Failures to
    /// append should be logged but should not fail the main operation.
    async fn append(&self, event: InviteEvent) -> Result<(), EventLogError>;

    /// Events of one invite, oldest first.
    async fn list_for_invite(&self, invite_id: &InviteId)
        -> Result<Vec<InviteEvent>, EventLogError>;

    /// Query events matching the filter, newest first.
    async fn query(&self, filter: EventLogFilter) -> Result<Vec<InviteEvent>, EventLogError>;

    /// Count events matching the filter (limit/offset ignored).
    async fn count(&self, filter: EventLogFilter) -> Result<u64, EventLogError>;
}
