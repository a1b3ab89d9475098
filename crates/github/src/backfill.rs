//! Import of existing open issues from an installation's pending repos.
//! Progress is written back onto the integration config after every repo, so
//! a crash mid-backfill resumes where it stopped instead of starting over.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use tether_core::domain::integration::{BackfillProgress, IntegrationId};
use tether_core::domain::thread::{ExternalRef, Platform, Thread, ThreadId, ThreadStatus};
use tether_db::repositories::{IntegrationRepository, RepositoryError, ThreadRepository};

use crate::client::{GitHubClient, GitHubClientError};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("integration `{0}` not found")]
    IntegrationNotFound(String),
    #[error("integration `{0}` has no installation id configured")]
    MissingInstallationId(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Client(#[from] GitHubClientError),
}

pub struct BackfillRunner {
    threads: Arc<dyn ThreadRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    client: Arc<dyn GitHubClient>,
}

impl BackfillRunner {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        client: Arc<dyn GitHubClient>,
    ) -> Self {
        Self { threads, integrations, client }
    }

    /// Drain the integration's pending repos, importing each open issue as a
    /// thread. Already-imported issues are skipped, so reruns converge.
    pub async fn run(&self, integration_id: &IntegrationId) -> Result<BackfillProgress, BackfillError> {
        let mut integration = self
            .integrations
            .find_by_id(integration_id)
            .await?
            .ok_or_else(|| BackfillError::IntegrationNotFound(integration_id.0.clone()))?;
        let installation_id = integration
            .config
            .installation_id
            .ok_or_else(|| BackfillError::MissingInstallationId(integration_id.0.clone()))?;

        let mut progress = integration.config.backfill.unwrap_or_default();

        while let Some(repo) = next_pending_repo(&mut integration) {
            let issues = self.client.list_open_issues(installation_id, &repo).await?;
            progress.total += issues.len() as u64;

            for issue in issues {
                let issue_id = issue.id.to_string();
                let existing = self.threads.list_by_external_issue_id(&issue_id).await?;
                if existing.is_empty() {
                    let now = Utc::now();
                    self.threads
                        .insert(Thread {
                            id: ThreadId::generate(),
                            organization_id: integration.organization_id.clone(),
                            name: issue.title.clone(),
                            status: ThreadStatus::Open,
                            priority: None,
                            author_id: None,
                            assigned_user_id: None,
                            external: Some(ExternalRef {
                                id: issue_id.clone(),
                                origin: Platform::Github,
                            }),
                            external_metadata: None,
                            external_issue_id: Some(issue_id),
                            external_pr_id: None,
                            deleted_at: None,
                            created_at: now,
                            updated_at: now,
                        })
                        .await?;
                }
                progress.processed += 1;
            }

            integration.config.repos.get_or_insert_with(Vec::new).push(repo.clone());
            integration.config.backfill = Some(progress);
            integration.updated_at = Utc::now();
            self.integrations.save(integration.clone()).await?;

            info!(
                event_name = "ingress.github.backfill_repo_done",
                integration_id = %integration_id.0,
                repo = %repo,
                processed = progress.processed,
                total = progress.total,
                "backfilled repository issues"
            );
        }

        Ok(progress)
    }
}

fn next_pending_repo(
    integration: &mut tether_core::domain::integration::Integration,
) -> Option<String> {
    let pending = integration.config.pending_repos.as_mut()?;
    if pending.is_empty() {
        return None;
    }
    Some(pending.remove(0))
}
