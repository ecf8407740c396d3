pub mod activate;
pub mod events;
pub mod invite;
pub mod moderate;
pub mod review;
pub mod session;
pub mod user;

pub use activate::{cmd_activate_complete, cmd_activate_verify};
pub use events::cmd_events;
pub use invite::{
    cmd_invite_confirm, cmd_invite_create, cmd_invite_list, cmd_invite_revoke, cmd_invite_verify,
};
pub use moderate::{cmd_moderate_approve, cmd_moderate_decline, cmd_moderate_reject};
pub use review::{cmd_review_create, cmd_review_list};
pub use session::{cmd_session_media, cmd_session_open, cmd_session_profile, cmd_session_show};
pub use user::{cmd_user_create, cmd_user_get};

use uuid::Uuid;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Parse a UUID argument, naming the argument on failure.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Uuid::try_parse(raw.trim()).map_err(|_| format!("Invalid {} ID: {}", what, raw).into())
}
