use chrono::{Duration, Utc};
use triad_storage::{CreateUserParams, Store, UserKind};

use super::CmdResult;

pub async fn cmd_user_create(
    store: &dyn Store,
    email: &str,
    kind: &str,
    name: Option<&str>,
    verified: bool,
    membership_days: Option<i64>,
    password: Option<&str>,
) -> CmdResult {
    let kind: UserKind = kind.parse()?;
    let display_name = match name {
        Some(name) => name.trim().to_string(),
        None => email.split('@').next().unwrap_or(email).trim().to_string(),
    };
    let password_hash = password.map(triad_crypto::hash_password).transpose()?;

    let user = store
        .create_user(&CreateUserParams {
            email: email.to_string(),
            kind,
            display_name,
            password_hash,
            identity_verified: verified,
            membership_expires_at: membership_days.map(|days| Utc::now() + Duration::days(days)),
        })
        .await?;

    println!("✓ User created: {}", user.id.0);
    println!("  Email: {}", user.email);
    println!("  Kind:  {}", user.kind);
    Ok(())
}

pub async fn cmd_user_get(store: &dyn Store, email: &str) -> CmdResult {
    let user = store.get_user_by_email(email).await?;

    println!("ID:         {}", user.id.0);
    println!("Email:      {}", user.email);
    println!("Kind:       {}", user.kind);
    println!("Name:       {}", user.display_name);
    println!("Verified:   {}", user.identity_verified);
    match user.membership_expires_at {
        Some(at) => println!("Membership: until {}", at),
        None => println!("Membership: none"),
    }
    println!("Password:   {}", if user.password_hash.is_some() { "set" } else { "not set" });
    Ok(())
}
