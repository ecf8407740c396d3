use chrono::Duration;
use triad_storage::{CreateUserParams, InviteStatus, Store, UserKind};

use super::common::*;
use crate::{ActivationOutcome, OnboardingError, TokenCheck};

/// Invite `email`, run verification and approve; returns the activation token.
async fn approved(h: &Harness, email: &str) -> (triad_storage::InviteId, String) {
    let couple = match h.store.get_user_by_email("pair@example.com").await {
        Ok(user) => user,
        Err(_) => h.couple("pair@example.com").await,
    };
    let (invite_id, invite_token) = h.invite(&couple, email).await;
    h.submit_for_review(&invite_token, "sammy").await;
    let token = h.approve(&invite_id, &couple.id).await;
    (invite_id, token)
}

#[tokio::test]
async fn concurrent_completion_activates_exactly_once() {
    let h = Harness::new().await;
    let (invite_id, token) = approved(&h, "sam@example.com").await;

    let attempts = (0..4).map(|_| {
        let ctx = h.ctx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            ctx.activation()
                .complete_activation(&token, PASSWORD)
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let mut activated = 0;
    let mut consumed = 0;
    for result in results {
        match result.unwrap().unwrap() {
            ActivationOutcome::Activated(_) => activated += 1,
            ActivationOutcome::Rejected(TokenCheck::Consumed) => consumed += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(activated, 1);
    assert_eq!(consumed, 3);
    assert_eq!(h.notifier.new_member_count(), 1);
    assert_eq!(
        h.store.get_invite(&invite_id).await.unwrap().status,
        InviteStatus::AwaitingCouple
    );
}

#[tokio::test]
async fn expired_activation_token_is_rejected() {
    let h = Harness::new().await;
    let (_, token) = approved(&h, "sam@example.com").await;

    h.clock.advance(Duration::hours(49));
    assert!(matches!(
        h.ctx.activation().verify_activation_token(&token).await.unwrap(),
        TokenCheck::Expired
    ));
    let outcome = h
        .ctx
        .activation()
        .complete_activation(&token, PASSWORD)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ActivationOutcome::Rejected(TokenCheck::Expired)
    ));
}

#[tokio::test]
async fn weak_password_keeps_the_token_usable() {
    let h = Harness::new().await;
    let (_, token) = approved(&h, "sam@example.com").await;

    let err = h
        .ctx
        .activation()
        .complete_activation(&token, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, OnboardingError::Validation(_)));

    assert!(h
        .ctx
        .activation()
        .verify_activation_token(&token)
        .await
        .unwrap()
        .is_valid());
}

#[tokio::test]
async fn reapproval_invalidates_the_previous_token() {
    let h = Harness::new().await;
    let (invite_id, first) = approved(&h, "sam@example.com").await;
    let moderator = h.couple("mod@example.com").await;
    let second = h.approve(&invite_id, &moderator.id).await;

    assert!(matches!(
        h.ctx.activation().verify_activation_token(&first).await.unwrap(),
        TokenCheck::Consumed
    ));
    let outcome = h
        .ctx
        .activation()
        .complete_activation(&second, PASSWORD)
        .await
        .unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated(_)));
}

#[tokio::test]
async fn revoked_invite_blocks_activation() {
    let h = Harness::new().await;
    let (invite_id, token) = approved(&h, "sam@example.com").await;
    let couple = h.store.get_user_by_email("pair@example.com").await.unwrap();
    h.ctx
        .invites()
        .revoke_invite(&invite_id, &couple.id)
        .await
        .unwrap();

    let outcome = h
        .ctx
        .activation()
        .complete_activation(&token, PASSWORD)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ActivationOutcome::Rejected(TokenCheck::Invalid)
    ));
}

#[tokio::test]
async fn couple_email_cannot_be_activated_as_single() {
    let h = Harness::new().await;
    let couple = h.couple("pair@example.com").await;
    // A couple account that was itself invited as a single.
    h.store
        .create_user(&CreateUserParams {
            email: "taken@example.com".to_string(),
            kind: UserKind::Couple,
            display_name: "taken".to_string(),
            password_hash: None,
            identity_verified: false,
            membership_expires_at: None,
        })
        .await
        .unwrap();
    let (invite_id, invite_token) = h.invite(&couple, "taken@example.com").await;
    h.submit_for_review(&invite_token, "taken").await;
    let token = h.approve(&invite_id, &couple.id).await;

    let err = h
        .ctx
        .activation()
        .complete_activation(&token, PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, OnboardingError::Conflict(_)));

    // Nothing was committed.
    assert!(h
        .ctx
        .activation()
        .verify_activation_token(&token)
        .await
        .unwrap()
        .is_valid());
    assert_eq!(h.notifier.new_member_count(), 0);
}

#[tokio::test]
async fn existing_single_keeps_credentials() {
    let h = Harness::new().await;
    let original = triad_crypto::hash_password("original password").unwrap();
    let existing = h
        .store
        .create_user(&CreateUserParams {
            email: "sam@example.com".to_string(),
            kind: UserKind::Single,
            display_name: "sam".to_string(),
            password_hash: Some(original.clone()),
            identity_verified: true,
            membership_expires_at: None,
        })
        .await
        .unwrap();
    let (_, token) = approved(&h, "sam@example.com").await;

    let ActivationOutcome::Activated(member) = h
        .ctx
        .activation()
        .complete_activation(&token, PASSWORD)
        .await
        .unwrap()
    else {
        panic!("activation should succeed");
    };
    assert!(!member.account_created);
    assert!(!member.password_set);
    assert_eq!(member.user.id, existing.id);
    assert_eq!(member.user.password_hash, Some(original));
}
