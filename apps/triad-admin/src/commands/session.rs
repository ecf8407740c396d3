use std::path::Path;

use triad_onboarding::{Onboarding, TokenCheck};
use triad_storage::{
    InviteId, MediaKind, MediaRef, ProfileSubmission, SessionId, Store, VerificationSession,
};

use super::{parse_id, CmdResult};

fn print_session(session: &VerificationSession) {
    println!("Session: {}", session.id.0);
    println!("Invite:  {}", session.invite_id.0);
    println!("Status:  {}", session.status);
    if let Some(profile) = &session.profile {
        println!("Profile: {}", profile.nickname);
    }
    println!("Media:   {}", session.media.len());
    if let Some(reason) = &session.rejection_reason {
        println!("Reason:  {}", reason);
    }
}

pub async fn cmd_session_open(ctx: &Onboarding, token: &str) -> CmdResult {
    match ctx.intake().open_session(token).await? {
        TokenCheck::Valid(session) => {
            println!("✓ Session ready\n");
            print_session(&session);
        }
        other => println!("✗ {}", other.message()),
    }
    Ok(())
}

pub async fn cmd_session_profile(ctx: &Onboarding, session_id: &str, file: &Path) -> CmdResult {
    let session_id = SessionId(parse_id(session_id, "session")?);
    let contents = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let profile: ProfileSubmission = serde_json::from_str(&contents)?;

    let session = ctx.intake().submit_profile(&session_id, profile).await?;
    println!("✓ Profile saved\n");
    print_session(&session);
    Ok(())
}

fn parse_media(item: &str) -> Result<MediaRef, Box<dyn std::error::Error>> {
    let (kind, blob_ref) = item
        .split_once(':')
        .ok_or_else(|| format!("Expected kind:ref, got '{}'", item))?;
    let kind = match kind {
        "photo" => MediaKind::Photo,
        "video" => MediaKind::Video,
        "identity_document" => MediaKind::IdentityDocument,
        other => return Err(format!("Unknown media kind: {}", other).into()),
    };
    Ok(MediaRef {
        blob_ref: blob_ref.to_string(),
        kind,
        caption: None,
    })
}

pub async fn cmd_session_media(ctx: &Onboarding, session_id: &str, items: &[String]) -> CmdResult {
    let session_id = SessionId(parse_id(session_id, "session")?);
    let media = items
        .iter()
        .map(|item| parse_media(item))
        .collect::<Result<Vec<_>, _>>()?;

    let session = ctx.intake().submit_media(&session_id, media).await?;
    println!("✓ Media submitted for review\n");
    print_session(&session);
    Ok(())
}

pub async fn cmd_session_show(store: &dyn Store, invite_id: &str) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let session = store.get_session_for_invite(&invite_id).await?;
    print_session(&session);
    Ok(())
}
