mod cli;
mod commands;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use triad_config::TriadConfig;
use triad_onboarding::{LogNotifier, Onboarding, OnboardingSettings, StoreEligibility, SystemClock};
use triad_store_sqlite::{RetryPolicy, SqliteStore, StoreOptions};

use cli::{
    ActivateCommand, Cli, Command, InviteCommand, ModerateCommand, ReviewCommand, SessionCommand,
    UserCommand,
};
use commands::*;

async fn open_store(config: &TriadConfig) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    let options = StoreOptions {
        max_connections: config.max_connections,
        retry: RetryPolicy {
            max_attempts: config.retry.max_attempts,
            backoff_step: config.retry.backoff_step(),
            statement_timeout: config.retry.statement_timeout(),
        },
        schema: None,
    };
    let url = match &config.database_url {
        Some(url) => url.clone(),
        None => {
            let home = triad_config::triad_home()?;
            std::fs::create_dir_all(&home)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&home, std::fs::Permissions::from_mode(0o700))?;
            }
            format!("sqlite://{}", home.join("triad.db").to_string_lossy())
        }
    };
    Ok(SqliteStore::open_with(&url, options).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TriadConfig::resolve(cli.config.as_deref())?;
    if let Some(url) = cli.database_url.clone() {
        config.database_url = Some(url);
    }

    let store = Arc::new(open_store(&config).await?);
    let eligibility = Arc::new(StoreEligibility::new(store.clone(), Arc::new(SystemClock)));
    let ctx = Onboarding::new(
        store.clone(),
        store.clone(),
        Arc::new(LogNotifier),
        eligibility,
        OnboardingSettings::from(&config.onboarding),
    );
    tracing::debug!(database_url = ?config.database_url, "store opened");

    let result = run(cli.command, &ctx, &store).await;
    store.close().await;
    result
}

async fn run(command: Command, ctx: &Onboarding, store: &SqliteStore) -> CmdResult {
    match command {
        Command::User { user_cmd } => match user_cmd {
            UserCommand::Create {
                email,
                kind,
                name,
                verified,
                membership_days,
                password,
            } => {
                cmd_user_create(
                    store,
                    &email,
                    &kind,
                    name.as_deref(),
                    verified,
                    membership_days,
                    password.as_deref(),
                )
                .await
            }
            UserCommand::Get { email } => cmd_user_get(store, &email).await,
        },
        Command::Invite { invite_cmd } => match invite_cmd {
            InviteCommand::Create {
                inviter_id,
                email,
                role,
                expires_hours,
                plain,
            } => cmd_invite_create(ctx, &inviter_id, &email, &role, expires_hours, plain).await,
            InviteCommand::List { inviter_id } => cmd_invite_list(ctx, &inviter_id).await,
            InviteCommand::Revoke {
                invite_id,
                actor_id,
            } => cmd_invite_revoke(ctx, &invite_id, &actor_id).await,
            InviteCommand::Verify { token } => cmd_invite_verify(ctx, &token).await,
            InviteCommand::Confirm {
                invite_id,
                actor_id,
            } => cmd_invite_confirm(ctx, &invite_id, &actor_id).await,
        },
        Command::Session { session_cmd } => match session_cmd {
            SessionCommand::Open { token } => cmd_session_open(ctx, &token).await,
            SessionCommand::Profile { session_id, file } => {
                cmd_session_profile(ctx, &session_id, &file).await
            }
            SessionCommand::Media { session_id, items } => {
                cmd_session_media(ctx, &session_id, &items).await
            }
            SessionCommand::Show { invite_id } => cmd_session_show(store, &invite_id).await,
        },
        Command::Moderate { moderate_cmd } => match moderate_cmd {
            ModerateCommand::Approve {
                invite_id,
                moderator_id,
            } => cmd_moderate_approve(ctx, &invite_id, &moderator_id).await,
            ModerateCommand::Reject {
                session_id,
                moderator_id,
                reason,
            } => cmd_moderate_reject(ctx, &session_id, &moderator_id, &reason).await,
            ModerateCommand::Decline {
                invite_id,
                moderator_id,
            } => cmd_moderate_decline(ctx, &invite_id, &moderator_id).await,
        },
        Command::Activate { activate_cmd } => match activate_cmd {
            ActivateCommand::Verify { token } => cmd_activate_verify(ctx, &token).await,
            ActivateCommand::Complete { token, password } => {
                cmd_activate_complete(ctx, &token, &password).await
            }
        },
        Command::Review { review_cmd } => match review_cmd {
            ReviewCommand::Create {
                single_id,
                couple_id,
                score,
                comment,
            } => cmd_review_create(ctx, &single_id, &couple_id, score, comment.as_deref()).await,
            ReviewCommand::List { single_id } => cmd_review_list(ctx, &single_id).await,
        },
        Command::Events { invite_id, kind } => cmd_events(store, &invite_id, kind.as_deref()).await,
    }
}
