use triad_onboarding::Onboarding;
use triad_storage::{InviteId, SessionId, UserId};

use super::{parse_id, CmdResult};

pub async fn cmd_moderate_approve(ctx: &Onboarding, invite_id: &str, moderator_id: &str) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let moderator_id = UserId(parse_id(moderator_id, "moderator")?);
    let notice = ctx.moderation().approve(&invite_id, &moderator_id).await?;

    println!("✓ Approved {} ({})\n", notice.invitee_email, notice.role_label);
    println!("Activation link: {}", notice.activation_link.as_str());
    println!("Expires:         {}", notice.expires_at);
    println!("\n⚠️  Earlier activation links for this invite no longer work");
    Ok(())
}

pub async fn cmd_moderate_reject(
    ctx: &Onboarding,
    session_id: &str,
    moderator_id: &str,
    reason: &str,
) -> CmdResult {
    let session_id = SessionId(parse_id(session_id, "session")?);
    let moderator_id = UserId(parse_id(moderator_id, "moderator")?);
    let session = ctx
        .moderation()
        .reject(&session_id, &moderator_id, reason)
        .await?;
    println!("✓ Session {} rejected", session.id.0);
    Ok(())
}

pub async fn cmd_moderate_decline(ctx: &Onboarding, invite_id: &str, moderator_id: &str) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let moderator_id = UserId(parse_id(moderator_id, "moderator")?);
    let invite = ctx.moderation().decline(&invite_id, &moderator_id).await?;
    println!("✓ Invite {} is {}", invite.id.0, invite.status);
    Ok(())
}
