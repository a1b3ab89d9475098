//! Installation bridge: persists Slack app installation grants inside the
//! owning integration's config, satisfying the SDK's installation-store
//! contract (store / fetch / delete keyed by team id).
//!
//! Lookups go through the team id embedded in config JSON, never the row's
//! primary id: the integration row is created before the OAuth round-trip
//! completes, holding nothing but a CSRF token and the team id.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use tether_core::domain::integration::Installation;
use tether_core::domain::thread::Platform;
use tether_db::repositories::{IntegrationRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum InstallationStoreError {
    #[error("no slack integration holds team id `{team_id}`")]
    IntegrationNotFound { team_id: String },
    #[error("no installation stored for team id `{team_id}`")]
    InstallationNotFound { team_id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct InstallationStore {
    integrations: Arc<dyn IntegrationRepository>,
}

impl InstallationStore {
    pub fn new(integrations: Arc<dyn IntegrationRepository>) -> Self {
        Self { integrations }
    }

    /// Merge an installation into the enabled-or-pending integration row for
    /// its team.
    pub async fn store(&self, installation: Installation) -> Result<(), InstallationStoreError> {
        let team_id = installation.team_id.clone();
        let mut integration = self
            .integrations
            .find_by_team_id(Platform::Slack, &team_id)
            .await?
            .ok_or(InstallationStoreError::IntegrationNotFound { team_id })?;

        integration.config.team_id = Some(installation.team_id.clone());
        integration.config.installation = Some(installation);
        integration.updated_at = Utc::now();
        self.integrations.save(integration).await?;

        Ok(())
    }

    pub async fn fetch(&self, team_id: &str) -> Result<Installation, InstallationStoreError> {
        let integration = self
            .integrations
            .find_by_team_id(Platform::Slack, team_id)
            .await?
            .ok_or_else(|| InstallationStoreError::IntegrationNotFound {
                team_id: team_id.to_string(),
            })?;

        integration.config.installation.ok_or_else(|| {
            InstallationStoreError::InstallationNotFound { team_id: team_id.to_string() }
        })
    }

    /// Remove the installation from config; absent rows and absent
    /// installations are both fine.
    pub async fn delete(&self, team_id: &str) -> Result<(), InstallationStoreError> {
        let Some(mut integration) =
            self.integrations.find_by_team_id(Platform::Slack, team_id).await?
        else {
            return Ok(());
        };

        if integration.config.installation.take().is_some() {
            integration.updated_at = Utc::now();
            self.integrations.save(integration).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use tether_core::domain::integration::{
        Installation, Integration, IntegrationConfig, IntegrationId,
    };
    use tether_core::domain::thread::Platform;
    use tether_db::repositories::{InMemoryIntegrationRepository, IntegrationRepository};

    use super::{InstallationStore, InstallationStoreError};

    async fn seeded_store(team_id: &str) -> (Arc<InMemoryIntegrationRepository>, InstallationStore)
    {
        let integrations = Arc::new(InMemoryIntegrationRepository::default());
        integrations
            .save(Integration {
                id: IntegrationId("INT-pending".to_string()),
                organization_id: "org-1".to_string(),
                kind: Platform::Slack,
                enabled: false,
                config: IntegrationConfig {
                    team_id: Some(team_id.to_string()),
                    csrf_token: Some("csrf".to_string()),
                    ..IntegrationConfig::default()
                },
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .expect("seed integration");

        let store = InstallationStore::new(integrations.clone());
        (integrations, store)
    }

    fn installation(team_id: &str) -> Installation {
        Installation {
            team_id: team_id.to_string(),
            enterprise_id: None,
            bot_token: "xoxb-install".to_string(),
            bot_user_id: "B0BOT".to_string(),
            scopes: vec!["chat:write".to_string()],
            installed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn store_then_fetch_round_trips_through_the_pending_row() {
        let (_integrations, store) = seeded_store("T0TEAM").await;

        store.store(installation("T0TEAM")).await.expect("store installation");

        let fetched = store.fetch("T0TEAM").await.expect("fetch installation");
        assert_eq!(fetched.bot_user_id, "B0BOT");
    }

    #[tokio::test]
    async fn store_fails_when_no_row_holds_the_team() {
        let (_integrations, store) = seeded_store("T0TEAM").await;

        let error = store.store(installation("T0STRANGER")).await.expect_err("must fail");
        assert!(matches!(error, InstallationStoreError::IntegrationNotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_distinguishes_missing_row_from_missing_installation() {
        let (_integrations, store) = seeded_store("T0TEAM").await;

        let error = store.fetch("T0STRANGER").await.expect_err("missing row");
        assert!(matches!(error, InstallationStoreError::IntegrationNotFound { .. }));

        let error = store.fetch("T0TEAM").await.expect_err("row without installation");
        assert!(matches!(error, InstallationStoreError::InstallationNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (integrations, store) = seeded_store("T0TEAM").await;
        store.store(installation("T0TEAM")).await.expect("store installation");

        store.delete("T0TEAM").await.expect("first delete");
        store.delete("T0TEAM").await.expect("second delete is a no-op");
        store.delete("T0STRANGER").await.expect("unknown team is a no-op");

        let row = integrations
            .find_by_team_id(Platform::Slack, "T0TEAM")
            .await
            .expect("lookup")
            .expect("row survives");
        assert!(row.config.installation.is_none());
        assert!(store.fetch("T0TEAM").await.is_err());
    }
}
