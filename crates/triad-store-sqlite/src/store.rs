use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use triad_storage::*;
use uuid::Uuid;

use crate::retry::map_sqlx;
use crate::rows::*;
use crate::SqliteStore;

// Statuses counted against an inviter's quota; `pending` invites past expiry are free.
macro_rules! active_invite_filter {
    () => {
        "inviter_id = ? \
         AND status IN ('pending', 'awaiting_verification', 'awaiting_activation', 'awaiting_couple') \
         AND NOT (status = 'pending' AND expires_at <= ?)"
    };
}

fn push_in<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    column: &'static str,
    values: impl IntoIterator<Item = &'static str>,
) {
    qb.push(" AND ").push(column).push(" IN (");
    let mut list = qb.separated(", ");
    for value in values {
        list.push_bind(value);
    }
    qb.push(")");
}

async fn acquire(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>, StoreError> {
    pool.acquire().await.map_err(map_sqlx)
}

async fn fetch_user(conn: &mut SqliteConnection, id: &str) -> Result<Option<User>, StoreError> {
    sqlx::query_as::<_, UserRow>(concat!("SELECT ", user_columns!(), " FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx)?
        .map(User::try_from)
        .transpose()
}

async fn fetch_user_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<User>, StoreError> {
    sqlx::query_as::<_, UserRow>(concat!(
        "SELECT ",
        user_columns!(),
        " FROM users WHERE email = ?"
    ))
    .bind(email)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(User::try_from)
    .transpose()
}

async fn fetch_invite(conn: &mut SqliteConnection, id: &str) -> Result<Option<Invite>, StoreError> {
    sqlx::query_as::<_, InviteRow>(concat!(
        "SELECT ",
        invite_columns!(),
        " FROM invites WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(Invite::try_from)
    .transpose()
}

async fn fetch_activation(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ActivationToken>, StoreError> {
    sqlx::query_as::<_, ActivationRow>(concat!(
        "SELECT ",
        activation_columns!(),
        " FROM invite_activations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(ActivationToken::try_from)
    .transpose()
}

async fn fetch_session(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<VerificationSession>, StoreError> {
    sqlx::query_as::<_, SessionRow>(concat!(
        "SELECT ",
        session_columns!(),
        " FROM verification_sessions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(VerificationSession::try_from)
    .transpose()
}

async fn fetch_session_for_invite(
    conn: &mut SqliteConnection,
    invite_id: &str,
) -> Result<Option<VerificationSession>, StoreError> {
    sqlx::query_as::<_, SessionRow>(concat!(
        "SELECT ",
        session_columns!(),
        " FROM verification_sessions WHERE invite_id = ?"
    ))
    .bind(invite_id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(VerificationSession::try_from)
    .transpose()
}

async fn fetch_profile(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<SingleProfile>, StoreError> {
    sqlx::query_as::<_, ProfileRow>(concat!(
        "SELECT ",
        profile_columns!(),
        " FROM single_profiles WHERE user_id = ?"
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(SingleProfile::try_from)
    .transpose()
}

async fn fetch_review(conn: &mut SqliteConnection, id: &str) -> Result<Option<Review>, StoreError> {
    sqlx::query_as::<_, ReviewRow>(concat!(
        "SELECT ",
        review_columns!(),
        " FROM reviews WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(map_sqlx)?
    .map(Review::try_from)
    .transpose()
}

async fn summarize(
    conn: &mut SqliteConnection,
    single_user_id: &str,
) -> Result<ReviewSummary, StoreError> {
    let (average_score, review_count): (f64, i64) = sqlx::query_as(
        "SELECT COALESCE(AVG(score), 0.0), COUNT(*) FROM reviews WHERE single_user_id = ?",
    )
    .bind(single_user_id)
    .fetch_one(conn)
    .await
    .map_err(map_sqlx)?;
    Ok(ReviewSummary {
        average_score,
        review_count,
    })
}

/// Fallback display name for an account created without a nickname.
fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        let id = Uuid::now_v7().to_string();
        let id = id.as_str();
        let email = normalize_email(&params.email);
        let email = email.as_str();
        let now = to_millis(Utc::now());
        let membership = params.membership_expires_at.map(to_millis);

        self.run("create_user", |pool| async move {
            let mut conn = acquire(&pool).await?;
            sqlx::query(
                "INSERT INTO users(id, email, kind, display_name, password_hash, identity_verified,
                                   membership_expires_at, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(id)
            .bind(email)
            .bind(params.kind.as_str())
            .bind(params.display_name.as_str())
            .bind(params.password_hash.as_deref())
            .bind(params.identity_verified)
            .bind(membership)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;

            fetch_user(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        let id = user_id.0.to_string();
        let id = id.as_str();
        self.run("get_user", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_user(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = normalize_email(email);
        let email = email.as_str();
        self.run("get_user_by_email", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_user_by_email(&mut conn, email)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let id = params.id.0.to_string();
        let id = id.as_str();
        let inviter = params.inviter_id.0.to_string();
        let inviter = inviter.as_str();
        let email = normalize_email(&params.invitee_email);
        let email = email.as_str();
        let at = to_millis(params.at);
        let expires_at = to_millis(params.expires_at);
        let limit = params.active_limit.map(i64::from).unwrap_or(i64::MAX);

        self.run("create_invite", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let inserted = sqlx::query(concat!(
                "INSERT INTO invites(id, inviter_id, invitee_email, role, status, token_hash,
                                     token_salt, expires_at, created_at, updated_at)
                 SELECT ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?
                 WHERE (SELECT COUNT(*) FROM invites WHERE ",
                active_invite_filter!(),
                ") < ?
                 ON CONFLICT(id) DO NOTHING"
            ))
            .bind(id)
            .bind(inviter)
            .bind(email)
            .bind(params.role.as_str())
            .bind(params.token_hash.as_str())
            .bind(params.token_salt.as_str())
            .bind(expires_at)
            .bind(at)
            .bind(at)
            .bind(inviter)
            .bind(at)
            .bind(limit)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;

            match fetch_invite(&mut conn, id).await? {
                Some(invite) => Ok(invite),
                None if inserted.rows_affected() == 0 => Err(StoreError::LimitReached),
                None => Err(StoreError::NotFound),
            }
        })
        .await
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        let id = invite_id.0.to_string();
        let id = id.as_str();
        self.run("get_invite", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_invite(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn list_invites_for_inviter(
        &self,
        inviter_id: &UserId,
    ) -> Result<Vec<Invite>, StoreError> {
        let inviter = inviter_id.0.to_string();
        let inviter = inviter.as_str();
        self.run("list_invites_for_inviter", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let rows = sqlx::query_as::<_, InviteRow>(concat!(
                "SELECT ",
                invite_columns!(),
                " FROM invites WHERE inviter_id = ? ORDER BY created_at DESC, id DESC"
            ))
            .bind(inviter)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx)?;
            convert_all(rows)
        })
        .await
    }

    async fn count_active_invites(
        &self,
        inviter_id: &UserId,
        now: chrono::DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let inviter = inviter_id.0.to_string();
        let inviter = inviter.as_str();
        let now = to_millis(now);
        self.run("count_active_invites", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let (count,): (i64,) = sqlx::query_as(concat!(
                "SELECT COUNT(*) FROM invites WHERE ",
                active_invite_filter!()
            ))
            .bind(inviter)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx)?;
            u32::try_from(count).map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn transition_invite(
        &self,
        transition: &InviteTransition,
    ) -> Result<Option<Invite>, StoreError> {
        if transition.from.is_empty() {
            return Ok(None);
        }
        let id = transition.invite_id.0.to_string();
        let id = id.as_str();
        let at = to_millis(transition.at);

        self.run("transition_invite", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE invites SET status = ");
            qb.push_bind(transition.to.as_str());
            qb.push(", updated_at = ").push_bind(at);
            if transition.stamp_consumed {
                qb.push(", consumed_at = COALESCE(consumed_at, ")
                    .push_bind(at)
                    .push(")");
            }
            qb.push(" WHERE id = ").push_bind(id);
            push_in(
                &mut qb,
                "status",
                transition.from.iter().map(InviteStatus::as_str),
            );
            qb.push(concat!(" RETURNING ", invite_columns!()));

            qb.build_query_as::<InviteRow>()
                .fetch_optional(&mut *conn)
                .await
                .map_err(map_sqlx)?
                .map(Invite::try_from)
                .transpose()
        })
        .await
    }

    // ───────────────────────────────────── Activations ────────────────────────────────────

    async fn issue_activation(
        &self,
        params: &IssueActivationParams,
    ) -> Result<ActivationToken, StoreError> {
        if params.allowed_from.is_empty() {
            return Err(StoreError::Conflict);
        }
        let id = params.id.0.to_string();
        let id = id.as_str();
        let invite_id = params.invite_id.0.to_string();
        let invite_id = invite_id.as_str();
        let creator = params.created_by_user_id.0.to_string();
        let creator = creator.as_str();
        let at = to_millis(params.at);
        let expires_at = to_millis(params.expires_at);

        self.run("issue_activation", |pool| async move {
            let mut tx = pool.begin().await.map_err(map_sqlx)?;

            // A retry after a commit we never heard back from.
            if let Some(existing) = fetch_activation(&mut *tx, id).await? {
                return Ok(existing);
            }

            let mut qb = QueryBuilder::<Sqlite>::new(
                "UPDATE invites SET status = 'awaiting_activation', updated_at = ",
            );
            qb.push_bind(at).push(" WHERE id = ").push_bind(invite_id);
            push_in(
                &mut qb,
                "status",
                params.allowed_from.iter().map(InviteStatus::as_str),
            );
            qb.push(" RETURNING id");
            let moved = qb
                .build_query_as::<(String,)>()
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if moved.is_none() {
                return match fetch_invite(&mut *tx, invite_id).await? {
                    Some(_) => Err(StoreError::Conflict),
                    None => Err(StoreError::NotFound),
                };
            }

            sqlx::query(
                "UPDATE invite_activations SET consumed_at = ?
                 WHERE invite_id = ? AND consumed_at IS NULL",
            )
            .bind(at)
            .bind(invite_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            sqlx::query(
                "INSERT INTO invite_activations(id, invite_id, token_hash, token_salt, expires_at,
                                                consumed_at, created_by_user_id, created_at)
                 VALUES(?, ?, ?, ?, ?, NULL, ?, ?)",
            )
            .bind(id)
            .bind(invite_id)
            .bind(params.token_hash.as_str())
            .bind(params.token_salt.as_str())
            .bind(expires_at)
            .bind(creator)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            tx.commit().await.map_err(map_sqlx)?;

            Ok(ActivationToken {
                id: params.id.clone(),
                invite_id: params.invite_id.clone(),
                token_hash: params.token_hash.clone(),
                token_salt: params.token_salt.clone(),
                expires_at: from_millis(expires_at)?,
                consumed_at: None,
                created_by_user_id: params.created_by_user_id.clone(),
                created_at: from_millis(at)?,
            })
        })
        .await
    }

    async fn get_activation(
        &self,
        activation_id: &ActivationId,
    ) -> Result<ActivationToken, StoreError> {
        let id = activation_id.0.to_string();
        let id = id.as_str();
        self.run("get_activation", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_activation(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn redeem_activation(
        &self,
        params: &RedeemActivationParams,
    ) -> Result<RedeemOutcome, StoreError> {
        let id = params.activation_id.0.to_string();
        let id = id.as_str();
        let new_user_id = Uuid::now_v7().to_string();
        let new_user_id = new_user_id.as_str();
        let at = to_millis(params.at);

        self.run("redeem_activation", |pool| async move {
            let mut tx = pool.begin().await.map_err(map_sqlx)?;

            // Claim first: of two concurrent redeemers only one sees a row here.
            let claimed: Option<(String, String)> = sqlx::query_as(
                "UPDATE invite_activations SET consumed_at = ?
                 WHERE id = ? AND consumed_at IS NULL AND expires_at > ?
                 RETURNING invite_id, created_by_user_id",
            )
            .bind(at)
            .bind(id)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let Some((invite_id, approved_by)) = claimed else {
                return match fetch_activation(&mut *tx, id).await? {
                    None => Err(StoreError::NotFound),
                    Some(token) if token.consumed_at.is_some() => Ok(RedeemOutcome::Consumed),
                    Some(_) => Ok(RedeemOutcome::Expired),
                };
            };

            let invite = fetch_invite(&mut *tx, &invite_id)
                .await?
                .ok_or(StoreError::NotFound)?;
            if invite.status != InviteStatus::AwaitingActivation {
                return Ok(RedeemOutcome::InviteClosed);
            }
            let session = fetch_session_for_invite(&mut *tx, &invite_id).await?;
            let submission = session.as_ref().and_then(|s| s.profile.clone());

            let (user_id, account_created, password_set) =
                match fetch_user_by_email(&mut *tx, &invite.invitee_email).await? {
                    Some(user) if user.kind == UserKind::Couple => {
                        return Err(StoreError::Conflict);
                    }
                    Some(user) => {
                        // Existing single accounts keep their credentials.
                        sqlx::query(
                            "UPDATE users SET password_hash = COALESCE(password_hash, ?),
                                              updated_at = ?
                             WHERE id = ?",
                        )
                        .bind(params.password_hash.as_str())
                        .bind(at)
                        .bind(user.id.0.to_string())
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx)?;
                        (user.id.0.to_string(), false, user.password_hash.is_none())
                    }
                    None => {
                        let display_name = submission
                            .as_ref()
                            .map(|p| p.nickname.as_str())
                            .unwrap_or_else(|| local_part(&invite.invitee_email));
                        sqlx::query(
                            "INSERT INTO users(id, email, kind, display_name, password_hash,
                                               identity_verified, membership_expires_at,
                                               created_at, updated_at)
                             VALUES(?, ?, 'single', ?, ?, 1, NULL, ?, ?)",
                        )
                        .bind(new_user_id)
                        .bind(invite.invitee_email.as_str())
                        .bind(display_name)
                        .bind(params.password_hash.as_str())
                        .bind(at)
                        .bind(at)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx)?;
                        (new_user_id.to_string(), true, true)
                    }
                };

            let linked = sqlx::query_as::<_, InviteRow>(concat!(
                "UPDATE invites SET status = 'awaiting_couple', invitee_user_id = ?, updated_at = ?
                 WHERE id = ? AND status = 'awaiting_activation'
                 RETURNING ",
                invite_columns!()
            ))
            .bind(user_id.as_str())
            .bind(at)
            .bind(invite_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            let Some(linked) = linked else {
                return Ok(RedeemOutcome::InviteClosed);
            };
            let invite = Invite::try_from(linked)?;

            let compliance = ComplianceSummary {
                media_submitted: session
                    .as_ref()
                    .map(|s| s.media.len() as u32)
                    .unwrap_or(0),
                moderated_by: session
                    .as_ref()
                    .and_then(|s| s.decision_user_id.as_ref().map(|u| u.0))
                    .or_else(|| Uuid::try_parse(&approved_by).ok()),
                moderated_at: session.as_ref().and_then(|s| s.decision_at),
            };
            let profile = submission.unwrap_or_default();
            let nickname = if profile.nickname.is_empty() {
                local_part(&invite.invitee_email).to_string()
            } else {
                profile.nickname.clone()
            };
            let availability = profile.availability.as_ref().map(to_json).transpose()?;

            sqlx::query(
                "INSERT INTO single_profiles(user_id, invite_source_user_id, nickname, contact_email,
                                             country, city, short_bio, interests, play_preferences,
                                             boundaries, availability_json, reputation_score,
                                             trusted_count, compliance_json, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                     invite_source_user_id = excluded.invite_source_user_id,
                     nickname = excluded.nickname,
                     contact_email = excluded.contact_email,
                     country = excluded.country,
                     city = excluded.city,
                     short_bio = excluded.short_bio,
                     interests = excluded.interests,
                     play_preferences = excluded.play_preferences,
                     boundaries = excluded.boundaries,
                     availability_json = excluded.availability_json,
                     compliance_json = excluded.compliance_json,
                     updated_at = excluded.updated_at",
            )
            .bind(user_id.as_str())
            .bind(invite.inviter_id.0.to_string())
            .bind(nickname.as_str())
            .bind(invite.invitee_email.as_str())
            .bind(profile.country.as_deref())
            .bind(profile.city.as_deref())
            .bind(profile.short_bio.as_deref())
            .bind(profile.interests.as_deref())
            .bind(profile.play_preferences.as_deref())
            .bind(profile.boundaries.as_deref())
            .bind(availability.as_deref())
            .bind(to_json(&compliance)?)
            .bind(at)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let user = fetch_user(&mut *tx, &user_id)
                .await?
                .ok_or(StoreError::NotFound)?;
            let profile = fetch_profile(&mut *tx, &user_id)
                .await?
                .ok_or(StoreError::NotFound)?;

            tx.commit().await.map_err(map_sqlx)?;

            Ok(RedeemOutcome::Redeemed(Box::new(Redemption {
                invite,
                user,
                profile,
                account_created,
                password_set,
            })))
        })
        .await
    }

    // ───────────────────────────────────── Verification Sessions ──────────────────────────

    async fn open_session(
        &self,
        params: &OpenSessionParams,
    ) -> Result<(VerificationSession, bool), StoreError> {
        let id = params.id.0.to_string();
        let id = id.as_str();
        let invite_id = params.invite_id.0.to_string();
        let invite_id = invite_id.as_str();
        let email = normalize_email(&params.invitee_email);
        let email = email.as_str();
        let at = to_millis(params.at);

        self.run("open_session", |pool| async move {
            let mut conn = acquire(&pool).await?;
            sqlx::query(
                "INSERT INTO verification_sessions(id, invite_id, invitee_email, status, media_json,
                                                   created_at, updated_at)
                 VALUES(?, ?, ?, 'awaiting_profile', '[]', ?, ?)
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(invite_id)
            .bind(email)
            .bind(at)
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;

            let session = fetch_session_for_invite(&mut conn, invite_id)
                .await?
                .ok_or(StoreError::NotFound)?;
            // Fresh ids per call: the session carries ours only if this call created it.
            let created = session.id == params.id;
            Ok((session, created))
        })
        .await
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<VerificationSession, StoreError> {
        let id = session_id.0.to_string();
        let id = id.as_str();
        self.run("get_session", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_session(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_session_for_invite(
        &self,
        invite_id: &InviteId,
    ) -> Result<VerificationSession, StoreError> {
        let id = invite_id.0.to_string();
        let id = id.as_str();
        self.run("get_session_for_invite", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_session_for_invite(&mut conn, id)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update_session(
        &self,
        update: &SessionUpdate,
    ) -> Result<Option<VerificationSession>, StoreError> {
        if update.from.is_empty() {
            return Ok(None);
        }
        let id = update.session_id.0.to_string();
        let id = id.as_str();
        let at = to_millis(update.at);
        let profile_json = update.profile.as_ref().map(to_json).transpose()?;
        let profile_json = profile_json.as_deref();
        let media_json = update.media.as_ref().map(to_json).transpose()?;
        let media_json = media_json.as_deref();
        let decided_by = update
            .decision
            .as_ref()
            .map(|d| d.decided_by.0.to_string());
        let decided_by = decided_by.as_deref();
        let decision = update.decision.as_ref();

        self.run("update_session", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE verification_sessions SET status = ");
            qb.push_bind(update.to.as_str());
            qb.push(", updated_at = ").push_bind(at);
            if let Some(profile_json) = profile_json {
                qb.push(", profile_json = ").push_bind(profile_json);
            }
            if let Some(media_json) = media_json {
                qb.push(", media_json = ").push_bind(media_json);
            }
            if let Some(decision) = decision {
                qb.push(", decision_user_id = ").push_bind(decided_by);
                qb.push(", decision_at = ")
                    .push_bind(to_millis(decision.decided_at));
                qb.push(", rejection_reason = ")
                    .push_bind(decision.rejection_reason.as_deref());
                qb.push(", moderation_notes = COALESCE(")
                    .push_bind(decision.notes.as_deref())
                    .push(", moderation_notes)");
            }
            qb.push(" WHERE id = ").push_bind(id);
            push_in(&mut qb, "status", update.from.iter().map(SessionStatus::as_str));
            qb.push(concat!(" RETURNING ", session_columns!()));

            qb.build_query_as::<SessionRow>()
                .fetch_optional(&mut *conn)
                .await
                .map_err(map_sqlx)?
                .map(VerificationSession::try_from)
                .transpose()
        })
        .await
    }

    // ───────────────────────────────────── Profiles & Reviews ─────────────────────────────

    async fn get_single_profile(&self, user_id: &UserId) -> Result<SingleProfile, StoreError> {
        let id = user_id.0.to_string();
        let id = id.as_str();
        self.run("get_single_profile", |pool| async move {
            let mut conn = acquire(&pool).await?;
            fetch_profile(&mut conn, id).await?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn create_review(
        &self,
        params: &CreateReviewParams,
    ) -> Result<(Review, ReviewSummary), StoreError> {
        let id = params.id.0.to_string();
        let id = id.as_str();
        let single = params.single_user_id.0.to_string();
        let single = single.as_str();
        let couple = params.couple_user_id.0.to_string();
        let couple = couple.as_str();
        let at = to_millis(params.at);

        self.run("create_review", |pool| async move {
            let mut tx = pool.begin().await.map_err(map_sqlx)?;

            sqlx::query(
                "INSERT INTO reviews(id, single_user_id, couple_user_id, score, comment, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(id)
            .bind(single)
            .bind(couple)
            .bind(i64::from(params.score))
            .bind(params.comment.as_deref())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let review = fetch_review(&mut *tx, id)
                .await?
                .ok_or(StoreError::NotFound)?;
            let summary = summarize(&mut *tx, single).await?;

            sqlx::query(
                "UPDATE single_profiles SET reputation_score = ?, trusted_count = ?, updated_at = ?
                 WHERE user_id = ?",
            )
            .bind(summary.average_score)
            .bind(summary.review_count)
            .bind(at)
            .bind(single)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            tx.commit().await.map_err(map_sqlx)?;
            Ok((review, summary))
        })
        .await
    }

    async fn list_reviews(&self, single_user_id: &UserId) -> Result<Vec<Review>, StoreError> {
        let single = single_user_id.0.to_string();
        let single = single.as_str();
        self.run("list_reviews", |pool| async move {
            let mut conn = acquire(&pool).await?;
            let rows = sqlx::query_as::<_, ReviewRow>(concat!(
                "SELECT ",
                review_columns!(),
                " FROM reviews WHERE single_user_id = ? ORDER BY created_at DESC, id DESC"
            ))
            .bind(single)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx)?;
            convert_all(rows)
        })
        .await
    }

    async fn review_summary(&self, single_user_id: &UserId) -> Result<ReviewSummary, StoreError> {
        let single = single_user_id.0.to_string();
        let single = single.as_str();
        self.run("review_summary", |pool| async move {
            let mut conn = acquire(&pool).await?;
            summarize(&mut conn, single).await
        })
        .await
    }
}
