use chrono::Duration;
use triad_onboarding::{Onboarding, TokenCheck};
use triad_storage::{InviteId, UserId};

use super::{parse_id, CmdResult};

pub async fn cmd_invite_create(
    ctx: &Onboarding,
    inviter_id: &str,
    email: &str,
    role: &str,
    expires_hours: Option<i64>,
    plain: bool,
) -> CmdResult {
    let inviter_id = UserId(parse_id(inviter_id, "inviter")?);
    let ttl = parse_expires_hours(expires_hours)?;
    let created = ctx
        .invites()
        .create_invite(&inviter_id, email, role, ttl)
        .await?;

    if plain {
        println!("{}", created.invite_url.as_str());
    } else {
        println!("✓ Invite created: {}\n", created.invite_id.0);
        println!("Link:    {}", created.invite_url.as_str());
        println!("Expires: {}", created.expires_at);
        println!("\n⚠️  This link is shown once; only its hash is stored");
    }
    Ok(())
}

fn parse_expires_hours(hours: Option<i64>) -> Result<Option<Duration>, String> {
    hours
        .map(|h| {
            Duration::try_hours(h).ok_or_else(|| format!("--expires-hours {} is out of range", h))
        })
        .transpose()
}

pub async fn cmd_invite_list(ctx: &Onboarding, inviter_id: &str) -> CmdResult {
    let inviter_id = UserId(parse_id(inviter_id, "inviter")?);
    let invites = ctx.invites().list_invites(&inviter_id).await?;

    if invites.is_empty() {
        println!("No invites found.");
        return Ok(());
    }
    println!("Invites ({}):\n", invites.len());
    for invite in invites {
        println!("ID:      {}", invite.id.0);
        println!("Invitee: {} ({})", invite.invitee_email, invite.role.label());
        println!("Status:  {}", invite.status);
        println!("Expires: {}", invite.expires_at);
        println!();
    }
    Ok(())
}

pub async fn cmd_invite_revoke(ctx: &Onboarding, invite_id: &str, actor_id: &str) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let actor_id = UserId(parse_id(actor_id, "user")?);
    let invite = ctx.invites().revoke_invite(&invite_id, &actor_id).await?;
    println!("✓ Invite {} is {}", invite.id.0, invite.status);
    Ok(())
}

pub async fn cmd_invite_verify(ctx: &Onboarding, token: &str) -> CmdResult {
    match ctx.invites().verify_invite_token(token).await? {
        TokenCheck::Valid(invite) => {
            println!("✓ Valid invite {}", invite.id.0);
            println!("  Invitee: {}", invite.invitee_email);
            println!("  Status:  {}", invite.status);
            println!("  Expires: {}", invite.expires_at);
        }
        other => println!("✗ {}", other.message()),
    }
    Ok(())
}

pub async fn cmd_invite_confirm(ctx: &Onboarding, invite_id: &str, actor_id: &str) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let actor_id = UserId(parse_id(actor_id, "user")?);
    let invite = ctx.invites().confirm_link(&invite_id, &actor_id).await?;
    println!("✓ Invite {} is {}", invite.id.0, invite.status);
    Ok(())
}
