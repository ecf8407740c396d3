//! Row structs and their conversion into storage records.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use triad_storage::*;
use uuid::Uuid;

macro_rules! user_columns {
    () => {
        "id, email, kind, display_name, password_hash, identity_verified, \
         membership_expires_at, created_at, updated_at"
    };
}

macro_rules! invite_columns {
    () => {
        "id, inviter_id, invitee_email, role, status, token_hash, token_salt, expires_at, \
         consumed_at, invitee_user_id, created_at, updated_at"
    };
}

macro_rules! activation_columns {
    () => {
        "id, invite_id, token_hash, token_salt, expires_at, consumed_at, created_by_user_id, \
         created_at"
    };
}

macro_rules! session_columns {
    () => {
        "id, invite_id, invitee_email, status, profile_json, media_json, moderation_notes, \
         decision_user_id, decision_at, rejection_reason, created_at, updated_at"
    };
}

macro_rules! profile_columns {
    () => {
        "user_id, invite_source_user_id, nickname, contact_email, country, city, short_bio, \
         interests, play_preferences, boundaries, availability_json, reputation_score, \
         trusted_count, compliance_json, created_at, updated_at"
    };
}

macro_rules! review_columns {
    () => {
        "id, single_user_id, couple_user_id, score, comment, created_at"
    };
}

macro_rules! event_columns {
    () => {
        "id, invite_id, kind, actor_user_id, details_json, created_at"
    };
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

fn opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    ms.map(from_millis).transpose()
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

fn opt_uuid(s: Option<&str>) -> Result<Option<Uuid>, StoreError> {
    s.map(parse_uuid).transpose()
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, StoreError> {
    s.parse().map_err(StoreError::Backend)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    email: String,
    kind: String,
    display_name: String,
    password_hash: Option<String>,
    identity_verified: bool,
    membership_expires_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(parse_uuid(&row.id)?),
            email: row.email,
            kind: parse_enum(&row.kind)?,
            display_name: row.display_name,
            password_hash: row.password_hash,
            identity_verified: row.identity_verified,
            membership_expires_at: opt_millis(row.membership_expires_at)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct InviteRow {
    id: String,
    inviter_id: String,
    invitee_email: String,
    role: String,
    status: String,
    token_hash: String,
    token_salt: String,
    expires_at: i64,
    consumed_at: Option<i64>,
    invitee_user_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<InviteRow> for Invite {
    type Error = StoreError;

    fn try_from(row: InviteRow) -> Result<Self, Self::Error> {
        Ok(Invite {
            id: InviteId(parse_uuid(&row.id)?),
            inviter_id: UserId(parse_uuid(&row.inviter_id)?),
            invitee_email: row.invitee_email,
            role: parse_enum(&row.role)?,
            status: parse_enum(&row.status)?,
            token_hash: row.token_hash,
            token_salt: row.token_salt,
            expires_at: from_millis(row.expires_at)?,
            consumed_at: opt_millis(row.consumed_at)?,
            invitee_user_id: opt_uuid(row.invitee_user_id.as_deref())?.map(UserId),
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ActivationRow {
    id: String,
    invite_id: String,
    token_hash: String,
    token_salt: String,
    expires_at: i64,
    consumed_at: Option<i64>,
    created_by_user_id: String,
    created_at: i64,
}

impl TryFrom<ActivationRow> for ActivationToken {
    type Error = StoreError;

    fn try_from(row: ActivationRow) -> Result<Self, Self::Error> {
        Ok(ActivationToken {
            id: ActivationId(parse_uuid(&row.id)?),
            invite_id: InviteId(parse_uuid(&row.invite_id)?),
            token_hash: row.token_hash,
            token_salt: row.token_salt,
            expires_at: from_millis(row.expires_at)?,
            consumed_at: opt_millis(row.consumed_at)?,
            created_by_user_id: UserId(parse_uuid(&row.created_by_user_id)?),
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    id: String,
    invite_id: String,
    invitee_email: String,
    status: String,
    profile_json: Option<String>,
    media_json: String,
    moderation_notes: Option<String>,
    decision_user_id: Option<String>,
    decision_at: Option<i64>,
    rejection_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SessionRow> for VerificationSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(VerificationSession {
            id: SessionId(parse_uuid(&row.id)?),
            invite_id: InviteId(parse_uuid(&row.invite_id)?),
            invitee_email: row.invitee_email,
            status: parse_enum(&row.status)?,
            profile: row.profile_json.as_deref().map(from_json).transpose()?,
            media: from_json(&row.media_json)?,
            moderation_notes: row.moderation_notes,
            decision_user_id: opt_uuid(row.decision_user_id.as_deref())?.map(UserId),
            decision_at: opt_millis(row.decision_at)?,
            rejection_reason: row.rejection_reason,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProfileRow {
    user_id: String,
    invite_source_user_id: Option<String>,
    nickname: String,
    contact_email: String,
    country: Option<String>,
    city: Option<String>,
    short_bio: Option<String>,
    interests: Option<String>,
    play_preferences: Option<String>,
    boundaries: Option<String>,
    availability_json: Option<String>,
    reputation_score: f64,
    trusted_count: i64,
    compliance_json: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ProfileRow> for SingleProfile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(SingleProfile {
            user_id: UserId(parse_uuid(&row.user_id)?),
            invite_source_user_id: opt_uuid(row.invite_source_user_id.as_deref())?.map(UserId),
            nickname: row.nickname,
            contact_email: row.contact_email,
            country: row.country,
            city: row.city,
            short_bio: row.short_bio,
            interests: row.interests,
            play_preferences: row.play_preferences,
            boundaries: row.boundaries,
            availability: row.availability_json.as_deref().map(from_json).transpose()?,
            reputation_score: row.reputation_score,
            trusted_count: row.trusted_count,
            compliance: from_json(&row.compliance_json)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReviewRow {
    id: String,
    single_user_id: String,
    couple_user_id: String,
    score: i64,
    comment: Option<String>,
    created_at: i64,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Review {
            id: ReviewId(parse_uuid(&row.id)?),
            single_user_id: UserId(parse_uuid(&row.single_user_id)?),
            couple_user_id: UserId(parse_uuid(&row.couple_user_id)?),
            score: u8::try_from(row.score)
                .map_err(|_| StoreError::Backend(format!("score out of range: {}", row.score)))?,
            comment: row.comment,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    pub(crate) id: String,
    pub(crate) invite_id: String,
    pub(crate) kind: String,
    pub(crate) actor_user_id: Option<String>,
    pub(crate) details_json: Option<String>,
    pub(crate) created_at: i64,
}

/// Convert a batch of rows, failing on the first bad one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_roundtrip_truncates_to_millis() {
        let at = from_millis(1_712_345_678_901).unwrap();
        assert_eq!(to_millis(at), 1_712_345_678_901);
    }

    #[test]
    fn bad_enum_text_is_backend_error() {
        let err = parse_enum::<InviteStatus>("archived").unwrap_err();
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("archived")));
    }

    #[test]
    fn column_lists_match_table_shapes() {
        assert_eq!(invite_columns!().split(',').count(), 12);
        assert_eq!(session_columns!().split(',').count(), 12);
        assert_eq!(profile_columns!().split(',').count(), 16);
    }
}
