use triad_onboarding::{ActivationOutcome, Onboarding, TokenCheck};

use super::CmdResult;

pub async fn cmd_activate_verify(ctx: &Onboarding, token: &str) -> CmdResult {
    match ctx.activation().verify_activation_token(token).await? {
        TokenCheck::Valid(grant) => {
            println!("✓ Valid activation for {}", grant.invite.invitee_email);
            println!("  Expires: {}", grant.expires_at);
        }
        other => println!("✗ {}", other.message()),
    }
    Ok(())
}

pub async fn cmd_activate_complete(ctx: &Onboarding, token: &str, password: &str) -> CmdResult {
    match ctx.activation().complete_activation(token, password).await? {
        ActivationOutcome::Activated(member) => {
            if member.account_created {
                println!("✓ Account created: {}", member.user.id.0);
            } else {
                println!("✓ Existing account linked: {}", member.user.id.0);
                if !member.password_set {
                    println!("⚠️  The account keeps its current password; the new one was not applied");
                }
            }
            println!("  Nickname: {}", member.profile.nickname);
            println!("  Invite:   {} ({})", member.invite.id.0, member.invite.status);
        }
        ActivationOutcome::Rejected(check) => println!("✗ {}", check.message()),
    }
    Ok(())
}
