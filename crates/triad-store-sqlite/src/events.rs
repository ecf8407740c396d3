use sqlx::{QueryBuilder, Sqlite};
use triad_audit::{EventKind, EventLog, EventLogError, EventLogFilter, EventLogId, InviteEvent};
use triad_storage::{InviteId, StoreError};

use crate::retry::map_sqlx;
use crate::rows::{from_millis, parse_uuid, to_json, to_millis, EventRow};
use crate::SqliteStore;

fn db_err(e: StoreError) -> EventLogError {
    EventLogError::Database(e.to_string())
}

fn to_event(row: EventRow) -> Result<InviteEvent, EventLogError> {
    let kind: EventKind = row.kind.parse().map_err(EventLogError::InvalidKind)?;
    let details = row
        .details_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| EventLogError::Database(e.to_string()))?;
    Ok(InviteEvent {
        id: EventLogId(parse_uuid(&row.id).map_err(db_err)?),
        invite_id: parse_uuid(&row.invite_id).map_err(db_err)?,
        kind,
        actor_user_id: row
            .actor_user_id
            .as_deref()
            .map(parse_uuid)
            .transpose()
            .map_err(db_err)?,
        details,
        created_at: from_millis(row.created_at).map_err(db_err)?,
    })
}

/// Append the WHERE clause for a filter. Every value is bound, never spliced.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EventLogFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(invite_id) = &filter.invite_id {
        qb.push(" AND invite_id = ").push_bind(invite_id.0.to_string());
    }
    if let Some(actor) = &filter.actor_user_id {
        qb.push(" AND actor_user_id = ").push_bind(actor.0.to_string());
    }
    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(to_millis(from));
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < ").push_bind(to_millis(to));
    }
}

#[async_trait::async_trait]
impl EventLog for SqliteStore {
    async fn append(&self, event: InviteEvent) -> Result<(), EventLogError> {
        let id = event.id.0.to_string();
        let id = id.as_str();
        let invite_id = event.invite_id.to_string();
        let invite_id = invite_id.as_str();
        let actor = event.actor_user_id.map(|u| u.to_string());
        let actor = actor.as_deref();
        let details = event
            .details
            .as_ref()
            .map(to_json)
            .transpose()
            .map_err(db_err)?;
        let details = details.as_deref();
        let at = to_millis(event.created_at);
        let kind = event.kind.as_str();

        self.run("append_event", |pool| async move {
            sqlx::query(
                "INSERT INTO invite_events(id, invite_id, kind, actor_user_id, details_json, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(id)
            .bind(invite_id)
            .bind(kind)
            .bind(actor)
            .bind(details)
            .bind(at)
            .execute(&pool)
            .await
            .map_err(map_sqlx)?;
            Ok(())
        })
        .await
        .map_err(db_err)
    }

    async fn list_for_invite(
        &self,
        invite_id: &InviteId,
    ) -> Result<Vec<InviteEvent>, EventLogError> {
        let invite_id = invite_id.0.to_string();
        let invite_id = invite_id.as_str();
        let rows = self
            .run("list_events", |pool| async move {
                sqlx::query_as::<_, EventRow>(concat!(
                    "SELECT ",
                    event_columns!(),
                    " FROM invite_events WHERE invite_id = ? ORDER BY created_at ASC, id ASC"
                ))
                .bind(invite_id)
                .fetch_all(&pool)
                .await
                .map_err(map_sqlx)
            })
            .await
            .map_err(db_err)?;
        rows.into_iter().map(to_event).collect()
    }

    async fn query(&self, filter: EventLogFilter) -> Result<Vec<InviteEvent>, EventLogError> {
        let filter = &filter;
        let rows = self
            .run("query_events", |pool| async move {
                let mut qb = QueryBuilder::<Sqlite>::new(concat!(
                    "SELECT ",
                    event_columns!(),
                    " FROM invite_events"
                ));
                push_filter(&mut qb, filter);
                qb.push(" ORDER BY created_at DESC, id DESC");
                // SQLite needs a LIMIT before an OFFSET; -1 means unbounded.
                qb.push(" LIMIT ")
                    .push_bind(filter.limit.map(i64::from).unwrap_or(-1));
                qb.push(" OFFSET ")
                    .push_bind(i64::from(filter.offset.unwrap_or(0)));
                qb.build_query_as::<EventRow>()
                    .fetch_all(&pool)
                    .await
                    .map_err(map_sqlx)
            })
            .await
            .map_err(db_err)?;
        rows.into_iter().map(to_event).collect()
    }

    async fn count(&self, filter: EventLogFilter) -> Result<u64, EventLogError> {
        let filter = &filter;
        let count = self
            .run("count_events", |pool| async move {
                let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM invite_events");
                push_filter(&mut qb, filter);
                let (count,) = qb
                    .build_query_as::<(i64,)>()
                    .fetch_one(&pool)
                    .await
                    .map_err(map_sqlx)?;
                Ok(count)
            })
            .await
            .map_err(db_err)?;
        u64::try_from(count).map_err(|e| EventLogError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use triad_storage::UserId;
    use uuid::Uuid;

    #[tokio::test]
    async fn append_is_idempotent_and_ordered() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let invite_id = InviteId(Uuid::now_v7());
        let t0 = Utc::now();

        let created = InviteEvent::builder(&invite_id, EventKind::Created)
            .at(t0)
            .build();
        let opened = InviteEvent::builder(&invite_id, EventKind::SessionOpened)
            .at(t0 + Duration::seconds(1))
            .details(serde_json::json!({"session_id": "s-1"}))
            .build();

        store.append(created.clone()).await.unwrap();
        store.append(created).await.unwrap();
        store.append(opened).await.unwrap();

        let events = store.list_for_invite(&invite_id).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Created, EventKind::SessionOpened]);
        assert_eq!(
            events[1].details.as_ref().unwrap()["session_id"],
            serde_json::json!("s-1")
        );
    }

    #[tokio::test]
    async fn query_and_count_apply_filters() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let invite_a = InviteId(Uuid::now_v7());
        let invite_b = InviteId(Uuid::now_v7());
        let moderator = UserId(Uuid::now_v7());

        store
            .append(InviteEvent::builder(&invite_a, EventKind::Created).build())
            .await
            .unwrap();
        store
            .append(
                InviteEvent::builder(&invite_a, EventKind::Approved)
                    .actor(Some(&moderator))
                    .build(),
            )
            .await
            .unwrap();
        store
            .append(InviteEvent::builder(&invite_b, EventKind::Created).build())
            .await
            .unwrap();

        let created = EventLogFilter::new().kind(EventKind::Created);
        assert_eq!(store.count(created.clone()).await.unwrap(), 2);

        let by_moderator = store
            .query(EventLogFilter::new().actor_user_id(moderator.clone()))
            .await
            .unwrap();
        assert_eq!(by_moderator.len(), 1);
        assert_eq!(by_moderator[0].get_actor_user_id(), Some(moderator));

        let first_page = store.query(created.limit(1)).await.unwrap();
        assert_eq!(first_page.len(), 1);

        let for_a = EventLogFilter::new().invite_id(invite_a).offset(1);
        assert_eq!(store.query(for_a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_kind_in_table_is_reported() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let invite_id = InviteId(Uuid::now_v7());
        let id = Uuid::now_v7().to_string();
        let invite = invite_id.0.to_string();
        store
            .run("seed", |pool| {
                let (id, invite) = (id.as_str(), invite.as_str());
                async move {
                    sqlx::query(
                        "INSERT INTO invite_events(id, invite_id, kind, created_at)
                         VALUES(?, ?, 'archived', 0)",
                    )
                    .bind(id)
                    .bind(invite)
                    .execute(&pool)
                    .await
                    .map_err(map_sqlx)?;
                    Ok(())
                }
            })
            .await
            .unwrap();

        let err = store.list_for_invite(&invite_id).await.unwrap_err();
        assert!(matches!(err, EventLogError::InvalidKind(_)));
    }
}
