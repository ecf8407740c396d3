//! Couples rate the singles they met.

use triad_storage::{
    CreateReviewParams, Review, ReviewId, ReviewSummary, StoreError, UserId, UserKind,
};
use uuid::Uuid;

use crate::error::not_found;
use crate::{Onboarding, OnboardingError, Result};

const COMMENT_MAX_CHARS: usize = 1000;

pub struct ReviewService<'a> {
    ctx: &'a Onboarding,
}

impl<'a> ReviewService<'a> {
    pub(crate) fn new(ctx: &'a Onboarding) -> Self {
        Self { ctx }
    }

    /// Record a couple's review of a single and return the refreshed aggregate.
    pub async fn create_review(
        &self,
        single_id: &UserId,
        couple_id: &UserId,
        score: u8,
        comment: Option<&str>,
    ) -> Result<(Review, ReviewSummary)> {
        if !(1..=5).contains(&score) {
            return Err(OnboardingError::Validation(
                "score must be between 1 and 5".into(),
            ));
        }
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        if comment.is_some_and(|c| c.chars().count() > COMMENT_MAX_CHARS) {
            return Err(OnboardingError::Validation(format!(
                "comment must be at most {} characters",
                COMMENT_MAX_CHARS
            )));
        }
        if single_id == couple_id {
            return Err(OnboardingError::Validation(
                "an account cannot review itself".into(),
            ));
        }

        let single = self
            .ctx
            .store
            .get_user(single_id)
            .await
            .map_err(not_found("single"))?;
        let couple = self
            .ctx
            .store
            .get_user(couple_id)
            .await
            .map_err(not_found("couple"))?;
        if single.kind != UserKind::Single || couple.kind != UserKind::Couple {
            return Err(OnboardingError::Validation(
                "reviews are written by couples about singles".into(),
            ));
        }

        let (review, summary) = self
            .ctx
            .store
            .create_review(&CreateReviewParams {
                id: ReviewId(Uuid::now_v7()),
                single_user_id: single_id.clone(),
                couple_user_id: couple_id.clone(),
                score,
                comment: comment.map(str::to_string),
                at: self.ctx.now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => {
                    OnboardingError::Duplicate("this couple already reviewed this single".into())
                }
                other => other.into(),
            })?;

        tracing::info!(
            single_id = %single_id.0,
            couple_id = %couple_id.0,
            score,
            review_count = summary.review_count,
            "review recorded"
        );
        Ok((review, summary))
    }

    /// Reviews of a single, newest first.
    pub async fn list_reviews(&self, single_id: &UserId) -> Result<Vec<Review>> {
        Ok(self.ctx.store.list_reviews(single_id).await?)
    }

    pub async fn summary(&self, single_id: &UserId) -> Result<ReviewSummary> {
        Ok(self.ctx.store.review_summary(single_id).await?)
    }
}
