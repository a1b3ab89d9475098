use sqlx::{sqlite::SqliteRow, Row};

use tether_core::domain::thread::{Platform, ThreadId};
use tether_core::domain::update::{
    ReplicationAck, ReplicationMarkers, Update, UpdateDetail, UpdateId,
};

use super::{parse_timestamp, OutboundUpdate, RepositoryError, UpdateRepository};
use crate::DbPool;

pub struct SqlUpdateRepository {
    pool: DbPool,
}

impl SqlUpdateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UpdateRepository for SqlUpdateRepository {
    async fn append(&self, update: Update) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&update.detail).map_err(|error| {
            RepositoryError::Decode(format!("unencodable update detail: {error}"))
        })?;
        let replicated = serde_json::to_string(&update.replicated).map_err(|error| {
            RepositoryError::Decode(format!("unencodable replication markers: {error}"))
        })?;

        sqlx::query(
            "INSERT INTO thread_update (
                id,
                thread_id,
                kind,
                user_id,
                metadata,
                replicated,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&update.id.0)
        .bind(&update.thread_id.0)
        .bind(update.kind().as_str())
        .bind(update.user_id.as_deref())
        .bind(metadata)
        .bind(replicated)
        .bind(update.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UpdateId) -> Result<Option<Update>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, thread_id, kind, user_id, metadata, replicated, created_at
             FROM thread_update
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(update_from_row).transpose()
    }

    async fn list_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Update>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, thread_id, kind, user_id, metadata, replicated, created_at
             FROM thread_update
             WHERE thread_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&thread_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(update_from_row).collect()
    }

    async fn list_unreplicated(
        &self,
        platform: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundUpdate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                u.id,
                u.thread_id,
                u.kind,
                u.user_id,
                u.metadata,
                u.replicated,
                u.created_at,
                t.organization_id,
                t.external_id AS thread_external_id,
                json_extract(t.external_metadata, '$.channel_id') AS channel_id
             FROM thread_update u
             JOIN thread t ON t.id = u.thread_id
             WHERE t.deleted_at IS NULL
               AND t.external_origin = ?
               AND t.external_id IS NOT NULL
               AND t.external_metadata IS NOT NULL
               AND json_extract(u.replicated, '$.' || ?) IS NULL
             ORDER BY u.created_at ASC
             LIMIT ?",
        )
        .bind(platform.as_str())
        .bind(platform.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(outbound_from_row).collect()
    }

    async fn mark_replicated(
        &self,
        id: &UpdateId,
        platform: Platform,
        ack: &ReplicationAck,
    ) -> Result<bool, RepositoryError> {
        let ack_json = serde_json::to_string(ack).map_err(|error| {
            RepositoryError::Decode(format!("unencodable replication ack: {error}"))
        })?;

        let result = sqlx::query(
            "UPDATE thread_update
             SET replicated = json_set(replicated, '$.' || ?, json(?))
             WHERE id = ? AND json_extract(replicated, '$.' || ?) IS NULL",
        )
        .bind(platform.as_str())
        .bind(ack_json)
        .bind(&id.0)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn update_from_row(row: SqliteRow) -> Result<Update, RepositoryError> {
    let metadata_raw = row.try_get::<String, _>("metadata")?;
    let detail = serde_json::from_str::<UpdateDetail>(&metadata_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid update metadata `{metadata_raw}`: {error}"))
    })?;

    let kind_raw = row.try_get::<String, _>("kind")?;
    if detail.kind().as_str() != kind_raw {
        return Err(RepositoryError::Decode(format!(
            "update kind column `{kind_raw}` disagrees with metadata tag `{}`",
            detail.kind().as_str()
        )));
    }

    let replicated_raw = row.try_get::<String, _>("replicated")?;
    let replicated =
        serde_json::from_str::<ReplicationMarkers>(&replicated_raw).map_err(|error| {
            RepositoryError::Decode(format!(
                "invalid replication markers `{replicated_raw}`: {error}"
            ))
        })?;

    Ok(Update {
        id: UpdateId(row.try_get("id")?),
        thread_id: ThreadId(row.try_get("thread_id")?),
        user_id: row.try_get("user_id")?,
        detail,
        replicated,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn outbound_from_row(row: SqliteRow) -> Result<OutboundUpdate, RepositoryError> {
    let organization_id = row.try_get("organization_id")?;
    let thread_external_id = row.try_get("thread_external_id")?;
    let channel_id = row.try_get("channel_id")?;
    let update = update_from_row(row)?;

    Ok(OutboundUpdate { update, organization_id, thread_external_id, channel_id })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use tether_core::domain::thread::{
        ExternalMetadata, ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
    };
    use tether_core::domain::update::{
        ReplicationAck, ReplicationMarkers, Update, UpdateDetail, UpdateId,
    };

    use super::SqlUpdateRepository;
    use crate::migrations;
    use crate::repositories::{SqlThreadRepository, ThreadRepository, UpdateRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn append_and_reload_preserves_detail_and_markers() {
        let (pool, thread_id) = setup_with_thread("T-upd-1", "1730000000.8000").await;
        let repo = SqlUpdateRepository::new(pool.clone());

        let update = status_update("U-upd-1", &thread_id, Some(Platform::Github));
        repo.append(update.clone()).await.expect("append update");

        let found = repo.find_by_id(&update.id).await.expect("find").expect("present");
        assert_eq!(found, update);

        pool.close().await;
    }

    #[tokio::test]
    async fn self_marked_updates_are_excluded_from_their_source_platform() {
        let (pool, thread_id) = setup_with_thread("T-upd-2", "1730000000.9000").await;
        let repo = SqlUpdateRepository::new(pool.clone());

        let mut update = status_update("U-upd-2", &thread_id, Some(Platform::Slack));
        update.replicated = ReplicationMarkers::suppressed_for(Platform::Slack);
        repo.append(update).await.expect("append update");

        let pending = repo.list_unreplicated(Platform::Slack, 50).await.expect("snapshot");
        assert!(pending.is_empty(), "suppressed update must never re-relay to its source");

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_replicated_claims_the_row_exactly_once() {
        let (pool, thread_id) = setup_with_thread("T-upd-3", "1730000001.0000").await;
        let repo = SqlUpdateRepository::new(pool.clone());

        let update = status_update("U-upd-3", &thread_id, None);
        repo.append(update.clone()).await.expect("append update");

        let pending = repo.list_unreplicated(Platform::Slack, 50).await.expect("snapshot");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel_id.as_deref(), Some("C0SUPPORT"));

        let ack = ReplicationAck::Delivered("1730000002.0001".to_string());
        let first =
            repo.mark_replicated(&update.id, Platform::Slack, &ack).await.expect("first mark");
        assert!(first);

        let second =
            repo.mark_replicated(&update.id, Platform::Slack, &ack).await.expect("second mark");
        assert!(!second, "marker writes must be first-wins");

        let reloaded = repo.find_by_id(&update.id).await.expect("reload").expect("present");
        assert!(reloaded.replicated.is_marked(Platform::Slack));

        let drained = repo.list_unreplicated(Platform::Slack, 50).await.expect("snapshot");
        assert!(drained.is_empty());

        pool.close().await;
    }

    async fn setup_with_thread(thread_id: &str, thread_ts: &str) -> (DbPool, ThreadId) {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let threads = SqlThreadRepository::new(pool.clone());
        let thread = Thread {
            id: ThreadId(thread_id.to_string()),
            organization_id: "org-1".to_string(),
            name: "payments failing".to_string(),
            status: ThreadStatus::Open,
            priority: None,
            author_id: None,
            assigned_user_id: None,
            external: Some(ExternalRef { id: thread_ts.to_string(), origin: Platform::Slack }),
            external_metadata: Some(ExternalMetadata {
                channel_id: Some("C0SUPPORT".to_string()),
            }),
            external_issue_id: None,
            external_pr_id: None,
            deleted_at: None,
            created_at: parse_ts("2026-03-01T12:00:00Z"),
            updated_at: parse_ts("2026-03-01T12:00:00Z"),
        };
        threads.insert(thread.clone()).await.expect("insert thread");

        (pool, thread.id)
    }

    fn status_update(id: &str, thread_id: &ThreadId, source: Option<Platform>) -> Update {
        Update {
            id: UpdateId(id.to_string()),
            thread_id: thread_id.clone(),
            user_id: None,
            detail: UpdateDetail::StatusChanged {
                old_status: tether_core::domain::thread::ThreadStatus::Open,
                new_status: tether_core::domain::thread::ThreadStatus::Resolved,
                old_label: "Open".to_string(),
                new_label: "Resolved".to_string(),
                source,
            },
            replicated: ReplicationMarkers::none(),
            created_at: parse_ts("2026-03-01T12:10:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
