use sqlx::{sqlite::SqliteRow, Row};

use tether_core::domain::author::AuthorId;
use tether_core::domain::message::{Message, MessageId, RichText};
use tether_core::domain::thread::{Platform, ThreadId};

use super::{parse_timestamp, MessageRepository, OutboundMessage, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO message (
                id,
                thread_id,
                author_id,
                content,
                origin,
                external_message_id,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.thread_id.0)
        .bind(message.author_id.as_ref().map(|id| id.0.as_str()))
        .bind(message.content.to_json())
        .bind(message.origin.map(|origin| origin.as_str()))
        .bind(message.external_message_id.as_deref())
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, thread_id, author_id, content, origin, external_message_id, created_at
             FROM message
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn find_by_external_id(
        &self,
        origin: Platform,
        external_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, thread_id, author_id, content, origin, external_message_id, created_at
             FROM message
             WHERE origin = ? AND external_message_id = ?
             LIMIT 1",
        )
        .bind(origin.as_str())
        .bind(external_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn list_unrelayed(
        &self,
        origin: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                m.id,
                m.thread_id,
                m.author_id,
                m.content,
                m.origin,
                m.external_message_id,
                m.created_at,
                t.organization_id,
                t.external_id AS thread_external_id,
                json_extract(t.external_metadata, '$.channel_id') AS channel_id
             FROM message m
             JOIN thread t ON t.id = m.thread_id
             WHERE m.external_message_id IS NULL
               AND t.deleted_at IS NULL
               AND t.external_origin = ?
               AND t.external_id IS NOT NULL
               AND t.external_metadata IS NOT NULL
             ORDER BY m.created_at ASC
             LIMIT ?",
        )
        .bind(origin.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(outbound_from_row).collect()
    }

    async fn mark_relayed(
        &self,
        id: &MessageId,
        external_message_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE message SET external_message_id = ?
             WHERE id = ? AND external_message_id IS NULL",
        )
        .bind(external_message_id)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let content_raw = row.try_get::<String, _>("content")?;
    let content = RichText::from_json(&content_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid message content `{content_raw}`: {error}"))
    })?;

    let origin = row
        .try_get::<Option<String>, _>("origin")?
        .map(|raw| super::parse_platform("origin", &raw))
        .transpose()?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        thread_id: ThreadId(row.try_get("thread_id")?),
        author_id: row.try_get::<Option<String>, _>("author_id")?.map(AuthorId),
        content,
        origin,
        external_message_id: row.try_get("external_message_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn outbound_from_row(row: SqliteRow) -> Result<OutboundMessage, RepositoryError> {
    let organization_id = row.try_get("organization_id")?;
    let thread_external_id = row.try_get("thread_external_id")?;
    let channel_id = row.try_get("channel_id")?;
    let message = message_from_row(row)?;

    Ok(OutboundMessage { message, organization_id, thread_external_id, channel_id })
}
