//! Single profile and review types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Availability, ReviewId, UserId};

/// Moderation facts recorded on the profile at activation time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub media_submitted: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderated_by: Option<uuid::Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderated_at: Option<DateTime<Utc>>,
}

/// Single profile record
#[derive(Clone, Debug)]
pub struct SingleProfile {
    pub user_id: UserId,
    pub invite_source_user_id: Option<UserId>, // Weak back-reference to the inviting couple
    pub nickname: String,
    pub contact_email: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub short_bio: Option<String>,
    pub interests: Option<String>,
    pub play_preferences: Option<String>,
    pub boundaries: Option<String>,
    pub availability: Option<Availability>,
    pub reputation_score: f64,
    pub trusted_count: i64,
    pub compliance: ComplianceSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review record
#[derive(Clone, Debug)]
pub struct Review {
    pub id: ReviewId,
    pub single_user_id: UserId,
    pub couple_user_id: UserId,
    pub score: u8, // 1..=5
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a review
#[derive(Clone, Debug)]
pub struct CreateReviewParams {
    pub id: ReviewId,
    pub single_user_id: UserId,
    pub couple_user_id: UserId,
    pub score: u8,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

/// Aggregate over all reviews of a single
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReviewSummary {
    pub average_score: f64,
    pub review_count: i64,
}
