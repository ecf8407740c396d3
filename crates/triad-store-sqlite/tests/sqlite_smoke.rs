use std::sync::Arc;

use chrono::{Duration, Utc};
use triad_storage::{
    ActivationId, CreateInviteParams, CreateReviewParams, CreateUserParams, InviteId,
    InviteRole, InviteStatus, InviteTransition, IssueActivationParams, MediaKind, MediaRef,
    OpenSessionParams, ProfileSubmission, RedeemActivationParams, RedeemOutcome, ReviewId,
    SessionDecision, SessionId, SessionStatus, SessionUpdate, Store, StoreError, User, UserId,
    UserKind,
};
use triad_store_sqlite::{SchemaGuard, SqliteStore, StoreOptions};
use uuid::Uuid;

async fn couple(s: &SqliteStore, email: &str) -> User {
    s.create_user(&CreateUserParams {
        email: email.to_string(),
        kind: UserKind::Couple,
        display_name: "Ana & Ben".to_string(),
        password_hash: None,
        identity_verified: true,
        membership_expires_at: Some(Utc::now() + Duration::days(30)),
    })
    .await
    .unwrap()
}

fn invite_params(inviter: &UserId, email: &str, limit: Option<u32>) -> CreateInviteParams {
    let now = Utc::now();
    CreateInviteParams {
        id: InviteId(Uuid::now_v7()),
        inviter_id: inviter.clone(),
        invitee_email: email.to_string(),
        role: InviteRole::SingleFemale,
        token_hash: "ab".repeat(32),
        token_salt: "cd".repeat(16),
        expires_at: now + Duration::days(7),
        active_limit: limit,
        at: now,
    }
}

fn activation_params(invite_id: &InviteId, moderator: &UserId) -> IssueActivationParams {
    let now = Utc::now();
    IssueActivationParams {
        id: ActivationId(Uuid::now_v7()),
        invite_id: invite_id.clone(),
        token_hash: "ef".repeat(32),
        token_salt: "01".repeat(16),
        expires_at: now + Duration::hours(48),
        created_by_user_id: moderator.clone(),
        allowed_from: vec![
            InviteStatus::Pending,
            InviteStatus::AwaitingVerification,
            InviteStatus::AwaitingActivation,
        ],
        at: now,
    }
}

fn redeem(activation_id: &ActivationId) -> RedeemActivationParams {
    RedeemActivationParams {
        activation_id: activation_id.clone(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        at: Utc::now(),
    }
}

#[tokio::test]
async fn users_are_unique_by_normalized_email() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let user = couple(&s, "  Pair@Example.com ").await;
    assert_eq!(user.email, "pair@example.com");
    assert_eq!(user.kind, UserKind::Couple);

    let fetched = s.get_user_by_email("PAIR@example.com").await.unwrap();
    assert_eq!(fetched.id, user.id);

    let err = s
        .create_user(&CreateUserParams {
            email: "pair@example.com".to_string(),
            kind: UserKind::Single,
            display_name: "x".to_string(),
            password_hash: None,
            identity_verified: false,
            membership_expires_at: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists));

    assert!(matches!(
        s.get_user(&UserId(Uuid::now_v7())).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn invite_insert_is_idempotent_and_quota_guarded() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;

    let first = invite_params(&inviter.id, "one@example.com", Some(2));
    let created = s.create_invite(&first).await.unwrap();
    assert_eq!(created.status, InviteStatus::Pending);
    assert!(created.consumed_at.is_none());

    // Replaying the same id returns the stored row instead of failing.
    let replay = s.create_invite(&first).await.unwrap();
    assert_eq!(replay.id, created.id);

    let mut second = invite_params(&inviter.id, "two@example.com", Some(2));
    second.at += Duration::seconds(1);
    s.create_invite(&second).await.unwrap();
    let err = s
        .create_invite(&invite_params(&inviter.id, "three@example.com", Some(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LimitReached));
    assert_eq!(
        s.count_active_invites(&inviter.id, Utc::now()).await.unwrap(),
        2
    );

    let listed = s.list_invites_for_inviter(&inviter.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].invitee_email, "two@example.com");
}

#[tokio::test]
async fn expired_pending_invites_do_not_count() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;

    let mut stale = invite_params(&inviter.id, "old@example.com", None);
    stale.expires_at = Utc::now() - Duration::hours(1);
    s.create_invite(&stale).await.unwrap();
    s.create_invite(&invite_params(&inviter.id, "new@example.com", None))
        .await
        .unwrap();

    assert_eq!(
        s.count_active_invites(&inviter.id, Utc::now()).await.unwrap(),
        1
    );
    // Only the fresh invite counts, which already fills a limit of one.
    assert!(matches!(
        s.create_invite(&invite_params(&inviter.id, "x@example.com", Some(1)))
            .await,
        Err(StoreError::LimitReached)
    ));
}

#[tokio::test]
async fn transition_is_compare_and_set() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "one@example.com", None))
        .await
        .unwrap();

    let revoke = InviteTransition {
        invite_id: invite.id.clone(),
        from: InviteStatus::NON_TERMINAL.to_vec(),
        to: InviteStatus::Revoked,
        stamp_consumed: true,
        at: Utc::now(),
    };
    let revoked = s.transition_invite(&revoke).await.unwrap().unwrap();
    assert_eq!(revoked.status, InviteStatus::Revoked);
    let stamped = revoked.consumed_at.unwrap();

    // Second attempt finds no row in a non-terminal state.
    assert!(s.transition_invite(&revoke).await.unwrap().is_none());
    let stored = s.get_invite(&invite.id).await.unwrap();
    assert_eq!(stored.status, InviteStatus::Revoked);
    assert_eq!(stored.consumed_at, Some(stamped));
}

#[tokio::test]
async fn issuing_activation_invalidates_previous_token() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let moderator = couple(&s, "mod@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "one@example.com", None))
        .await
        .unwrap();

    let first = activation_params(&invite.id, &moderator.id);
    let token_a = s.issue_activation(&first).await.unwrap();
    // Replay with the same id is a no-op.
    let again = s.issue_activation(&first).await.unwrap();
    assert!(again.consumed_at.is_none());

    let token_b = s
        .issue_activation(&activation_params(&invite.id, &moderator.id))
        .await
        .unwrap();
    assert!(s
        .get_activation(&token_a.id)
        .await
        .unwrap()
        .consumed_at
        .is_some());
    assert!(s
        .get_activation(&token_b.id)
        .await
        .unwrap()
        .consumed_at
        .is_none());
    assert_eq!(
        s.get_invite(&invite.id).await.unwrap().status,
        InviteStatus::AwaitingActivation
    );

    assert!(matches!(
        s.redeem_activation(&redeem(&token_a.id)).await.unwrap(),
        RedeemOutcome::Consumed
    ));
}

#[tokio::test]
async fn issue_activation_refuses_terminal_invites() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "one@example.com", None))
        .await
        .unwrap();
    s.transition_invite(&InviteTransition {
        invite_id: invite.id.clone(),
        from: vec![InviteStatus::Pending],
        to: InviteStatus::Declined,
        stamp_consumed: true,
        at: Utc::now(),
    })
    .await
    .unwrap();

    let err = s
        .issue_activation(&activation_params(&invite.id, &inviter.id))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    let missing = s
        .issue_activation(&activation_params(&InviteId(Uuid::now_v7()), &inviter.id))
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::NotFound));
}

#[tokio::test]
async fn session_lifecycle_and_redemption_hydrate_profile() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let moderator = couple(&s, "mod@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "Sam@Example.com", None))
        .await
        .unwrap();

    let open = OpenSessionParams {
        id: SessionId(Uuid::now_v7()),
        invite_id: invite.id.clone(),
        invitee_email: invite.invitee_email.clone(),
        at: Utc::now(),
    };
    let (session, created) = s.open_session(&open).await.unwrap();
    assert!(created);
    assert_eq!(session.status, SessionStatus::AwaitingProfile);

    let (same, created_again) = s
        .open_session(&OpenSessionParams {
            id: SessionId(Uuid::now_v7()),
            ..open.clone()
        })
        .await
        .unwrap();
    assert!(!created_again);
    assert_eq!(same.id, session.id);

    let profile = ProfileSubmission {
        nickname: "sam".to_string(),
        city: Some("Lisbon".to_string()),
        ..ProfileSubmission::default()
    };
    let updated = s
        .update_session(&SessionUpdate {
            session_id: session.id.clone(),
            from: vec![SessionStatus::AwaitingProfile],
            to: SessionStatus::AwaitingUploads,
            profile: Some(profile.clone()),
            media: None,
            decision: None,
            at: Utc::now(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.profile.as_ref(), Some(&profile));

    let media = vec![MediaRef {
        blob_ref: "blob://1".to_string(),
        kind: MediaKind::Photo,
        caption: None,
    }];
    s.update_session(&SessionUpdate {
        session_id: session.id.clone(),
        from: vec![SessionStatus::AwaitingUploads],
        to: SessionStatus::UnderReview,
        profile: None,
        media: Some(media.clone()),
        decision: None,
        at: Utc::now(),
    })
    .await
    .unwrap()
    .unwrap();

    // Wrong precondition leaves the row alone.
    assert!(s
        .update_session(&SessionUpdate {
            session_id: session.id.clone(),
            from: vec![SessionStatus::AwaitingProfile],
            to: SessionStatus::AwaitingUploads,
            profile: None,
            media: None,
            decision: None,
            at: Utc::now(),
        })
        .await
        .unwrap()
        .is_none());

    let decided_at = Utc::now();
    let approved = s
        .update_session(&SessionUpdate {
            session_id: session.id.clone(),
            from: vec![SessionStatus::UnderReview],
            to: SessionStatus::Approved,
            profile: None,
            media: None,
            decision: Some(SessionDecision {
                decided_by: moderator.id.clone(),
                decided_at,
                rejection_reason: None,
                notes: Some("ok".to_string()),
            }),
            at: decided_at,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.media, media);
    assert_eq!(approved.decision_user_id, Some(moderator.id.clone()));

    let token = s
        .issue_activation(&activation_params(&invite.id, &moderator.id))
        .await
        .unwrap();
    let RedeemOutcome::Redeemed(redemption) = s.redeem_activation(&redeem(&token.id)).await.unwrap()
    else {
        panic!("expected redemption");
    };

    assert!(redemption.account_created);
    assert!(redemption.password_set);
    assert_eq!(redemption.user.kind, UserKind::Single);
    assert_eq!(redemption.user.email, "sam@example.com");
    assert_eq!(redemption.invite.status, InviteStatus::AwaitingCouple);
    assert_eq!(redemption.invite.invitee_user_id, Some(redemption.user.id.clone()));
    assert_eq!(redemption.profile.nickname, "sam");
    assert_eq!(redemption.profile.city.as_deref(), Some("Lisbon"));
    assert_eq!(redemption.profile.invite_source_user_id, Some(inviter.id.clone()));
    assert_eq!(redemption.profile.compliance.media_submitted, 1);
    assert_eq!(redemption.profile.compliance.moderated_by, Some(moderator.id.0));

    let stored = s.get_single_profile(&redemption.user.id).await.unwrap();
    assert_eq!(stored.contact_email, "sam@example.com");

    assert!(matches!(
        s.redeem_activation(&redeem(&token.id)).await.unwrap(),
        RedeemOutcome::Consumed
    ));
}

#[tokio::test]
async fn redemption_rolls_back_when_email_belongs_to_a_couple() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    couple(&s, "taken@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "taken@example.com", None))
        .await
        .unwrap();
    let token = s
        .issue_activation(&activation_params(&invite.id, &inviter.id))
        .await
        .unwrap();

    let err = s.redeem_activation(&redeem(&token.id)).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    // Nothing committed: the token is still redeemable and the invite unchanged.
    assert!(s
        .get_activation(&token.id)
        .await
        .unwrap()
        .consumed_at
        .is_none());
    assert_eq!(
        s.get_invite(&invite.id).await.unwrap().status,
        InviteStatus::AwaitingActivation
    );
}

#[tokio::test]
async fn expired_and_closed_redemptions() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "one@example.com", None))
        .await
        .unwrap();

    let mut stale = activation_params(&invite.id, &inviter.id);
    stale.expires_at = Utc::now() - Duration::minutes(1);
    let stale = s.issue_activation(&stale).await.unwrap();
    assert!(matches!(
        s.redeem_activation(&redeem(&stale.id)).await.unwrap(),
        RedeemOutcome::Expired
    ));

    let fresh = s
        .issue_activation(&activation_params(&invite.id, &inviter.id))
        .await
        .unwrap();
    s.transition_invite(&InviteTransition {
        invite_id: invite.id.clone(),
        from: InviteStatus::NON_TERMINAL.to_vec(),
        to: InviteStatus::Revoked,
        stamp_consumed: true,
        at: Utc::now(),
    })
    .await
    .unwrap();
    assert!(matches!(
        s.redeem_activation(&redeem(&fresh.id)).await.unwrap(),
        RedeemOutcome::InviteClosed
    ));

    assert!(matches!(
        s.redeem_activation(&redeem(&ActivationId(Uuid::now_v7())))
            .await,
        Err(StoreError::NotFound)
    ));
}

async fn race_redemptions(s: Arc<SqliteStore>) {
    let inviter = couple(&s, "pair@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "racer@example.com", None))
        .await
        .unwrap();
    let token = s
        .issue_activation(&activation_params(&invite.id, &inviter.id))
        .await
        .unwrap();

    let attempts = (0..8).map(|_| {
        let s = s.clone();
        let params = redeem(&token.id);
        tokio::spawn(async move { s.redeem_activation(&params).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut redeemed = 0;
    let mut consumed = 0;
    for result in results {
        match result.unwrap().unwrap() {
            RedeemOutcome::Redeemed(_) => redeemed += 1,
            RedeemOutcome::Consumed => consumed += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(redeemed, 1);
    assert_eq!(consumed, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemption_in_memory() {
    let s = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    race_redemptions(s).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemption_on_file_with_pool() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("race.db").display());
    let s = SqliteStore::open_with(
        &url,
        StoreOptions {
            max_connections: 4,
            ..StoreOptions::default()
        },
    )
    .await
    .unwrap();
    race_redemptions(Arc::new(s)).await;
}

#[tokio::test]
async fn reviews_are_unique_per_pair_and_refresh_reputation() {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let inviter = couple(&s, "pair@example.com").await;
    let other = couple(&s, "other@example.com").await;
    let invite = s
        .create_invite(&invite_params(&inviter.id, "single@example.com", None))
        .await
        .unwrap();
    let token = s
        .issue_activation(&activation_params(&invite.id, &inviter.id))
        .await
        .unwrap();
    let RedeemOutcome::Redeemed(redemption) = s.redeem_activation(&redeem(&token.id)).await.unwrap()
    else {
        panic!("expected redemption");
    };
    let single = redemption.user.id.clone();

    let review = |couple: &UserId, score: u8| CreateReviewParams {
        id: ReviewId(Uuid::now_v7()),
        single_user_id: single.clone(),
        couple_user_id: couple.clone(),
        score,
        comment: Some("lovely".to_string()),
        at: Utc::now(),
    };

    let first = review(&inviter.id, 5);
    let (_, summary) = s.create_review(&first).await.unwrap();
    assert_eq!(summary.review_count, 1);

    // Replay of the same review id is not a duplicate.
    let (replayed, _) = s.create_review(&first).await.unwrap();
    assert_eq!(replayed.id, first.id);

    let dup = s.create_review(&review(&inviter.id, 1)).await.unwrap_err();
    assert!(matches!(dup, StoreError::AlreadyExists));

    let mut later = review(&other.id, 2);
    later.at += Duration::seconds(1);
    let (_, summary) = s.create_review(&later).await.unwrap();
    assert_eq!(summary.review_count, 2);
    assert!((summary.average_score - 3.5).abs() < f64::EPSILON);

    let profile = s.get_single_profile(&single).await.unwrap();
    assert_eq!(profile.trusted_count, 2);
    assert!((profile.reputation_score - 3.5).abs() < f64::EPSILON);

    let listed = s.list_reviews(&single).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].couple_user_id, other.id);
    assert_eq!(s.review_summary(&single).await.unwrap(), summary);
}

#[tokio::test]
async fn shared_schema_guard_migrates_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shared.db").display());
    let guard = Arc::new(SchemaGuard::new());
    let options = StoreOptions {
        schema: Some(guard.clone()),
        ..StoreOptions::default()
    };

    let a = SqliteStore::open_with(&url, options.clone()).await.unwrap();
    assert!(guard.is_done().await);
    let b = SqliteStore::open_with(&url, options).await.unwrap();

    let user = couple(&a, "pair@example.com").await;
    assert_eq!(b.get_user(&user.id).await.unwrap().email, user.email);
}
