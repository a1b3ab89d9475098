use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{parse_timestamp, RelayCursorRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRelayCursorRepository {
    pool: DbPool,
}

impl SqlRelayCursorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RelayCursorRepository for SqlRelayCursorRepository {
    async fn record_pass(
        &self,
        consumer: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO relay_cursor (consumer, last_completed_at, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(consumer) DO UPDATE SET
                last_completed_at = excluded.last_completed_at,
                updated_at = excluded.updated_at",
        )
        .bind(consumer)
        .bind(completed_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_completed(
        &self,
        consumer: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row = sqlx::query("SELECT last_completed_at FROM relay_cursor WHERE consumer = ?")
            .bind(consumer)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| parse_timestamp("last_completed_at", row.try_get("last_completed_at")?))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::SqlRelayCursorRepository;
    use crate::migrations;
    use crate::repositories::RelayCursorRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn cursor_advances_across_passes() {
        let pool = setup_pool().await;
        let repo = SqlRelayCursorRepository::new(pool.clone());

        assert_eq!(repo.last_completed("relay.slack").await.expect("empty read"), None);

        let first_pass = parse_ts("2026-03-01T12:00:00Z");
        repo.record_pass("relay.slack", first_pass).await.expect("record first");
        assert_eq!(
            repo.last_completed("relay.slack").await.expect("read"),
            Some(first_pass)
        );

        let second_pass = parse_ts("2026-03-01T12:00:05Z");
        repo.record_pass("relay.slack", second_pass).await.expect("record second");
        assert_eq!(
            repo.last_completed("relay.slack").await.expect("read"),
            Some(second_pass)
        );

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
