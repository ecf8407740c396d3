use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "triad-admin")]
#[command(about = "Operate the triad invite and verification workflow")]
pub struct Cli {
    /// SQLite database URL (defaults to ~/.triad/triad.db)
    #[arg(long, env = "TRIAD_DATABASE_URL")]
    pub database_url: Option<String>,

    /// JSON config file; TRIAD_* environment variables override it
    #[arg(long, env = "TRIAD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// User accounts
    User {
        #[command(subcommand)]
        user_cmd: UserCommand,
    },
    /// Invites sent by couples
    Invite {
        #[command(subcommand)]
        invite_cmd: InviteCommand,
    },
    /// Invitee verification sessions
    Session {
        #[command(subcommand)]
        session_cmd: SessionCommand,
    },
    /// Moderator decisions
    Moderate {
        #[command(subcommand)]
        moderate_cmd: ModerateCommand,
    },
    /// Activation tokens
    Activate {
        #[command(subcommand)]
        activate_cmd: ActivateCommand,
    },
    /// Reviews of singles by couples
    Review {
        #[command(subcommand)]
        review_cmd: ReviewCommand,
    },
    /// Invite history
    Events {
        /// Invite ID
        invite_id: String,
        /// Only show one event kind (e.g. approved)
        #[arg(long)]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user account
    Create {
        /// Email address
        email: String,
        /// couple or single
        #[arg(long, default_value = "couple")]
        kind: String,
        /// Display name (defaults to the email's local part)
        #[arg(long)]
        name: Option<String>,
        /// Mark the identity as verified
        #[arg(long)]
        verified: bool,
        /// Membership length in days
        #[arg(long)]
        membership_days: Option<i64>,
        /// Initial password
        #[arg(long, env = "TRIAD_USER_PASSWORD")]
        password: Option<String>,
    },
    /// Show a user by email
    Get {
        /// Email address
        email: String,
    },
}

#[derive(Subcommand)]
pub enum InviteCommand {
    /// Create an invite and print its link
    Create {
        /// Inviting couple's user ID
        inviter_id: String,
        /// Invitee email
        email: String,
        /// single_male or single_female
        #[arg(long, default_value = "single_female")]
        role: String,
        /// Hours until the invite expires
        #[arg(long)]
        expires_hours: Option<i64>,
        /// Print only the link
        #[arg(long)]
        plain: bool,
    },
    /// List invites sent by a user
    List {
        /// Inviter user ID
        inviter_id: String,
    },
    /// Revoke an invite
    Revoke {
        /// Invite ID
        invite_id: String,
        /// Acting user ID (must be the inviter)
        actor_id: String,
    },
    /// Check an invite token
    Verify {
        /// Invite token
        token: String,
    },
    /// Confirm the link after activation
    Confirm {
        /// Invite ID
        invite_id: String,
        /// Inviter user ID
        actor_id: String,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Open (or resume) the session for an invite token
    Open {
        /// Invite token
        token: String,
    },
    /// Submit the invitee profile from a JSON file
    Profile {
        /// Session ID
        session_id: String,
        /// Path to a JSON profile
        file: PathBuf,
    },
    /// Submit media references as kind:ref (photo, video, identity_document)
    Media {
        /// Session ID
        session_id: String,
        /// Media items, e.g. photo:blob://abc
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Show the session of an invite
    Show {
        /// Invite ID
        invite_id: String,
    },
}

#[derive(Subcommand)]
pub enum ModerateCommand {
    /// Approve an invitee and issue an activation link
    Approve {
        /// Invite ID
        invite_id: String,
        /// Moderator user ID
        moderator_id: String,
    },
    /// Reject a verification session
    Reject {
        /// Session ID
        session_id: String,
        /// Moderator user ID
        moderator_id: String,
        /// Reason shown to the invitee
        #[arg(long)]
        reason: String,
    },
    /// Decline an invite outright
    Decline {
        /// Invite ID
        invite_id: String,
        /// Moderator user ID
        moderator_id: String,
    },
}

#[derive(Subcommand)]
pub enum ActivateCommand {
    /// Check an activation token
    Verify {
        /// Activation token
        token: String,
    },
    /// Redeem an activation token and set the password
    Complete {
        /// Activation token
        token: String,
        /// New password
        #[arg(long, env = "TRIAD_ACTIVATION_PASSWORD")]
        password: String,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommand {
    /// Review a single on behalf of a couple
    Create {
        /// Single user ID
        single_id: String,
        /// Couple user ID
        couple_id: String,
        /// Score from 1 to 5
        score: u8,
        /// Optional comment
        #[arg(long)]
        comment: Option<String>,
    },
    /// List reviews and the reputation summary of a single
    List {
        /// Single user ID
        single_id: String,
    },
}
