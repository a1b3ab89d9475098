use sqlx::{sqlite::SqliteRow, Row};

use tether_core::domain::integration::{Integration, IntegrationConfig, IntegrationId};
use tether_core::domain::thread::Platform;

use super::{parse_platform, parse_timestamp, IntegrationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIntegrationRepository {
    pool: DbPool,
}

impl SqlIntegrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn encode_config(config: &IntegrationConfig) -> Result<String, RepositoryError> {
    serde_json::to_string(config).map_err(|error| {
        RepositoryError::Decode(format!("unencodable integration config: {error}"))
    })
}

#[async_trait::async_trait]
impl IntegrationRepository for SqlIntegrationRepository {
    async fn insert(&self, integration: Integration) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO integration (
                id,
                organization_id,
                kind,
                enabled,
                config,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&integration.id.0)
        .bind(&integration.organization_id)
        .bind(integration.kind.as_str())
        .bind(integration.enabled)
        .bind(encode_config(&integration.config)?)
        .bind(integration.created_at.to_rfc3339())
        .bind(integration.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, integration: Integration) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO integration (
                id,
                organization_id,
                kind,
                enabled,
                config,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                kind = excluded.kind,
                enabled = excluded.enabled,
                config = excluded.config,
                updated_at = excluded.updated_at",
        )
        .bind(&integration.id.0)
        .bind(&integration.organization_id)
        .bind(integration.kind.as_str())
        .bind(integration.enabled)
        .bind(encode_config(&integration.config)?)
        .bind(integration.created_at.to_rfc3339())
        .bind(integration.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, kind, enabled, config, created_at, updated_at
             FROM integration
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(integration_from_row).transpose()
    }

    async fn find_enabled(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, kind, enabled, config, created_at, updated_at
             FROM integration
             WHERE organization_id = ? AND kind = ? AND enabled = 1",
        )
        .bind(organization_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(integration_from_row).transpose()
    }

    async fn find_by_team_id(
        &self,
        kind: Platform,
        team_id: &str,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, kind, enabled, config, created_at, updated_at
             FROM integration
             WHERE kind = ? AND json_extract(config, '$.team_id') = ?
             ORDER BY enabled DESC, updated_at DESC
             LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(integration_from_row).transpose()
    }

    async fn find_latest(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, kind, enabled, config, created_at, updated_at
             FROM integration
             WHERE organization_id = ? AND kind = ?
             ORDER BY updated_at DESC, created_at DESC
             LIMIT 1",
        )
        .bind(organization_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(integration_from_row).transpose()
    }
}

fn integration_from_row(row: SqliteRow) -> Result<Integration, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let config_raw = row.try_get::<String, _>("config")?;
    let config = serde_json::from_str::<IntegrationConfig>(&config_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid integration config `{config_raw}`: {error}"))
    })?;

    Ok(Integration {
        id: IntegrationId(row.try_get("id")?),
        organization_id: row.try_get("organization_id")?,
        kind: parse_platform("kind", &kind_raw)?,
        enabled: row.try_get("enabled")?,
        config,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
