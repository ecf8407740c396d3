use triad_onboarding::Onboarding;
use triad_storage::UserId;

use super::{parse_id, CmdResult};

pub async fn cmd_review_create(
    ctx: &Onboarding,
    single_id: &str,
    couple_id: &str,
    score: u8,
    comment: Option<&str>,
) -> CmdResult {
    let single_id = UserId(parse_id(single_id, "single")?);
    let couple_id = UserId(parse_id(couple_id, "couple")?);
    let (review, summary) = ctx
        .reviews()
        .create_review(&single_id, &couple_id, score, comment)
        .await?;

    println!("✓ Review {} saved", review.id.0);
    println!(
        "  Reputation: {:.2} from {} review(s)",
        summary.average_score, summary.review_count
    );
    Ok(())
}

pub async fn cmd_review_list(ctx: &Onboarding, single_id: &str) -> CmdResult {
    let single_id = UserId(parse_id(single_id, "single")?);
    let reviews = ctx.reviews().list_reviews(&single_id).await?;
    let summary = ctx.reviews().summary(&single_id).await?;

    if reviews.is_empty() {
        println!("No reviews found.");
        return Ok(());
    }
    println!(
        "Reviews ({}, average {:.2}):\n",
        summary.review_count, summary.average_score
    );
    for review in reviews {
        println!("Score:  {}/5", review.score);
        println!("Couple: {}", review.couple_user_id.0);
        println!("Date:   {}", review.created_at);
        if let Some(comment) = review.comment {
            println!("        {}", comment);
        }
        println!();
    }
    Ok(())
}
