//! Invite history from the event log.

use triad_audit::{EventKind, EventLog, EventLogFilter};
use triad_storage::InviteId;

use super::{parse_id, CmdResult};

pub async fn cmd_events(events: &dyn EventLog, invite_id: &str, kind: Option<&str>) -> CmdResult {
    let invite_id = InviteId(parse_id(invite_id, "invite")?);
    let mut filter = EventLogFilter::new().invite_id(invite_id);
    if let Some(kind) = kind {
        filter = filter.kind(kind.parse::<EventKind>()?);
    }
    let entries = events.query(filter).await?;

    if entries.is_empty() {
        println!("No events found.");
        return Ok(());
    }
    for entry in entries {
        let actor = entry
            .get_actor_user_id()
            .map(|id| id.0.to_string())
            .unwrap_or_else(|| "invitee".to_string());
        println!("{}  {:<22} {}", entry.created_at, entry.kind, actor);
        if let Some(details) = entry.details {
            println!("    {}", details);
        }
    }
    Ok(())
}
