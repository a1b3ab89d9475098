use sqlx::{sqlite::SqliteRow, Row};

use tether_core::domain::author::AuthorId;
use tether_core::domain::thread::{
    ExternalMetadata, ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
};

use super::{
    parse_optional_timestamp, parse_platform, parse_timestamp, RepositoryError, ThreadRepository,
};
use crate::DbPool;

const THREAD_COLUMNS: &str = "id,
                organization_id,
                name,
                status,
                priority,
                author_id,
                assigned_user_id,
                external_id,
                external_origin,
                external_metadata,
                external_issue_id,
                external_pr_id,
                deleted_at,
                created_at,
                updated_at";

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn insert(&self, thread: Thread) -> Result<(), RepositoryError> {
        let (external_id, external_origin) = match &thread.external {
            Some(external) => (Some(external.id.as_str()), Some(external.origin.as_str())),
            None => (None, None),
        };
        let external_metadata = thread
            .external_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| {
                RepositoryError::Decode(format!("unencodable external metadata: {error}"))
            })?;

        sqlx::query(
            "INSERT INTO thread (
                id,
                organization_id,
                name,
                status,
                priority,
                author_id,
                assigned_user_id,
                external_id,
                external_origin,
                external_metadata,
                external_issue_id,
                external_pr_id,
                deleted_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id.0)
        .bind(&thread.organization_id)
        .bind(&thread.name)
        .bind(thread.status.as_i64())
        .bind(thread.priority)
        .bind(thread.author_id.as_ref().map(|id| id.0.as_str()))
        .bind(thread.assigned_user_id.as_deref())
        .bind(external_id)
        .bind(external_origin)
        .bind(external_metadata.as_deref())
        .bind(thread.external_issue_id.as_deref())
        .bind(thread.external_pr_id.as_deref())
        .bind(thread.deleted_at.map(|value| value.to_rfc3339()))
        .bind(thread.created_at.to_rfc3339())
        .bind(thread.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn find_by_external_ref(
        &self,
        origin: Platform,
        external_id: &str,
    ) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread
             WHERE external_origin = ? AND external_id = ? AND deleted_at IS NULL"
        ))
        .bind(origin.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn list_by_external_issue_id(
        &self,
        issue_id: &str,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread
             WHERE external_issue_id = ? AND deleted_at IS NULL
             ORDER BY created_at ASC"
        ))
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(thread_from_row).collect()
    }

    async fn list_by_external_pr_id(&self, pr_id: &str) -> Result<Vec<Thread>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread
             WHERE external_pr_id = ? AND deleted_at IS NULL
             ORDER BY created_at ASC"
        ))
        .bind(pr_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(thread_from_row).collect()
    }

    async fn set_status(
        &self,
        id: &ThreadId,
        status: ThreadStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE thread SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(status.as_i64())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn thread_from_row(row: SqliteRow) -> Result<Thread, RepositoryError> {
    let status_raw = row.try_get::<i64, _>("status")?;
    let status = ThreadStatus::from_i64(status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown thread status `{status_raw}`")))?;

    let external_id = row.try_get::<Option<String>, _>("external_id")?;
    let external_origin = row.try_get::<Option<String>, _>("external_origin")?;
    let external = match (external_id, external_origin) {
        (Some(id), Some(origin)) => {
            Some(ExternalRef { id, origin: parse_platform("external_origin", &origin)? })
        }
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "external_id and external_origin must be set together".to_string(),
            ))
        }
    };

    let external_metadata = row
        .try_get::<Option<String>, _>("external_metadata")?
        .map(|raw| {
            serde_json::from_str::<ExternalMetadata>(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid external metadata `{raw}`: {error}"))
            })
        })
        .transpose()?;

    Ok(Thread {
        id: ThreadId(row.try_get("id")?),
        organization_id: row.try_get("organization_id")?,
        name: row.try_get("name")?,
        status,
        priority: row.try_get("priority")?,
        author_id: row.try_get::<Option<String>, _>("author_id")?.map(AuthorId),
        assigned_user_id: row.try_get("assigned_user_id")?,
        external,
        external_metadata,
        external_issue_id: row.try_get("external_issue_id")?,
        external_pr_id: row.try_get("external_pr_id")?,
        deleted_at: parse_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
