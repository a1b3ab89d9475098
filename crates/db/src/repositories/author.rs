use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use tether_core::domain::author::{Author, AuthorId};

use super::{parse_timestamp, AuthorRepository, NewPlatformAuthor, RepositoryError};
use crate::DbPool;

pub struct SqlAuthorRepository {
    pool: DbPool,
}

impl SqlAuthorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuthorRepository for SqlAuthorRepository {
    async fn get_or_insert_platform_author(
        &self,
        author: NewPlatformAuthor,
    ) -> Result<Author, RepositoryError> {
        // Single-statement upsert: concurrent ingest of the same platform
        // user converges on one row, and the caller reads its own write.
        let row = sqlx::query(
            "INSERT INTO author (id, organization_id, user_id, meta_id, name, created_at)
             VALUES (?, ?, NULL, ?, ?, ?)
             ON CONFLICT(organization_id, meta_id) WHERE meta_id IS NOT NULL
             DO UPDATE SET name = excluded.name
             RETURNING id, organization_id, user_id, meta_id, name, created_at",
        )
        .bind(AuthorId::generate().0)
        .bind(&author.organization_id)
        .bind(&author.meta_id)
        .bind(&author.name)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        author_from_row(row)
    }

    async fn find_by_id(&self, id: &AuthorId) -> Result<Option<Author>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, user_id, meta_id, name, created_at
             FROM author
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(author_from_row).transpose()
    }
}

fn author_from_row(row: SqliteRow) -> Result<Author, RepositoryError> {
    Ok(Author {
        id: AuthorId(row.try_get("id")?),
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        meta_id: row.try_get("meta_id")?,
        name: row.try_get("name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::SqlAuthorRepository;
    use crate::migrations;
    use crate::repositories::{AuthorRepository, NewPlatformAuthor};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn repeated_upserts_converge_on_one_row() {
        let pool = setup_pool().await;
        let repo = SqlAuthorRepository::new(pool.clone());

        let first = repo
            .get_or_insert_platform_author(platform_author("org-1", "U0MAYA", "Maya"))
            .await
            .expect("first upsert");
        let second = repo
            .get_or_insert_platform_author(platform_author("org-1", "U0MAYA", "Maya R."))
            .await
            .expect("second upsert");

        assert_eq!(first.id, second.id, "same (org, meta_id) must reuse the row");
        assert_eq!(second.name, "Maya R.", "latest display name wins");

        let reloaded = repo.find_by_id(&first.id).await.expect("find").expect("present");
        assert_eq!(reloaded.meta_id.as_deref(), Some("U0MAYA"));

        pool.close().await;
    }

    #[tokio::test]
    async fn same_platform_user_in_two_orgs_gets_two_rows() {
        let pool = setup_pool().await;
        let repo = SqlAuthorRepository::new(pool.clone());

        let in_org_1 = repo
            .get_or_insert_platform_author(platform_author("org-1", "U0SAM", "Sam"))
            .await
            .expect("org-1 upsert");
        let in_org_2 = repo
            .get_or_insert_platform_author(platform_author("org-2", "U0SAM", "Sam"))
            .await
            .expect("org-2 upsert");

        assert_ne!(in_org_1.id, in_org_2.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_user_produce_at_most_one_row() {
        let pool = setup_pool().await;
        let repo = std::sync::Arc::new(SqlAuthorRepository::new(pool.clone()));

        let mut handles = Vec::new();
        for attempt in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.get_or_insert_platform_author(platform_author(
                    "org-1",
                    "U0BURST",
                    &format!("Burst {attempt}"),
                ))
                .await
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let author = handle.await.expect("join").expect("upsert");
            ids.insert(author.id.0);
        }

        assert_eq!(ids.len(), 1, "all concurrent upserts must land on one author row");

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn platform_author(organization_id: &str, meta_id: &str, name: &str) -> NewPlatformAuthor {
        NewPlatformAuthor {
            organization_id: organization_id.to_string(),
            meta_id: meta_id.to_string(),
            name: name.to_string(),
        }
    }
}
