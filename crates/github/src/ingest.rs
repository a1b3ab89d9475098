//! GitHub webhook ingest: lifecycle events resolve their candidate threads
//! through the fixed status translation table, writing one audit update per
//! transition. The update is self-marked as replicated to GitHub so the
//! outbound relay can never echo it back to the platform it came from.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use tether_core::domain::thread::{Platform, Thread, ThreadId};
use tether_core::domain::update::{ReplicationMarkers, Update, UpdateDetail, UpdateId};
use tether_core::translate::{translate, LifecycleEvent};
use tether_db::repositories::{RepositoryError, ThreadRepository, UpdateRepository};

use crate::webhook::WebhookEvent;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestContext {
    pub delivery_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub resolved: Vec<ThreadId>,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct GithubIngestor {
    threads: Arc<dyn ThreadRepository>,
    updates: Arc<dyn UpdateRepository>,
}

impl GithubIngestor {
    pub fn new(threads: Arc<dyn ThreadRepository>, updates: Arc<dyn UpdateRepository>) -> Self {
        Self { threads, updates }
    }

    pub async fn handle_event(
        &self,
        event: &WebhookEvent,
        ctx: &IngestContext,
    ) -> Result<IngestReport, IngestError> {
        match event {
            WebhookEvent::IssuesClosed(payload) => {
                let candidates = self
                    .threads
                    .list_by_external_issue_id(&payload.issue.id.to_string())
                    .await?;
                self.resolve_candidates(LifecycleEvent::IssueClosed, candidates, ctx).await
            }
            WebhookEvent::PullRequestClosed(payload) => {
                let lifecycle = if payload.pull_request.merged {
                    LifecycleEvent::PullRequestMerged
                } else {
                    LifecycleEvent::PullRequestClosed
                };
                let candidates = self
                    .threads
                    .list_by_external_pr_id(&payload.pull_request.id.to_string())
                    .await?;
                self.resolve_candidates(lifecycle, candidates, ctx).await
            }
            WebhookEvent::Other { event, action } => {
                // Catch-all: every delivery is logged, nothing else happens.
                debug!(
                    event_name = "ingress.github.unhandled_event",
                    correlation_id = %ctx.delivery_id,
                    event = %event,
                    action = action.as_deref().unwrap_or("none"),
                    "ignoring unconsumed github event"
                );
                Ok(IngestReport::default())
            }
        }
    }

    async fn resolve_candidates(
        &self,
        lifecycle: LifecycleEvent,
        candidates: Vec<Thread>,
        ctx: &IngestContext,
    ) -> Result<IngestReport, IngestError> {
        if candidates.is_empty() {
            debug!(
                event_name = "ingress.github.no_candidates",
                correlation_id = %ctx.delivery_id,
                lifecycle = ?lifecycle,
                "no threads reference this issue or pull request"
            );
            return Ok(IngestReport::default());
        }

        let mut report = IngestReport::default();
        for thread in candidates {
            let Some(transition) = translate(lifecycle, thread.status) else {
                // Already Resolved, Closed, or Duplicate: redelivery and
                // late events land here and stay no-ops.
                report.skipped += 1;
                continue;
            };

            self.threads.set_status(&thread.id, transition.new_status).await?;
            self.updates
                .append(Update {
                    id: UpdateId::generate(),
                    thread_id: thread.id.clone(),
                    user_id: None,
                    detail: UpdateDetail::StatusChanged {
                        old_status: transition.old_status,
                        new_status: transition.new_status,
                        old_label: transition.old_status.label().to_string(),
                        new_label: transition.new_status.label().to_string(),
                        source: Some(Platform::Github),
                    },
                    replicated: ReplicationMarkers::suppressed_for(Platform::Github),
                    created_at: Utc::now(),
                })
                .await?;

            info!(
                event_name = "ingress.github.thread_resolved",
                correlation_id = %ctx.delivery_id,
                thread_id = %thread.id.0,
                old_status = transition.old_status.label(),
                new_status = transition.new_status.label(),
                "external close resolved thread"
            );
            report.resolved.push(thread.id);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use tether_core::domain::thread::{
        ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
    };
    use tether_core::domain::update::UpdateDetail;
    use tether_db::repositories::{
        InMemoryThreadRepository, InMemoryUpdateRepository, ThreadRepository, UpdateRepository,
    };

    use crate::webhook::{parse_event, WebhookEvent};

    use super::{GithubIngestor, IngestContext};

    fn issue_thread(id: &str, issue_id: &str, status: ThreadStatus) -> Thread {
        Thread {
            id: ThreadId(id.to_string()),
            organization_id: "org-1".to_string(),
            name: format!("thread {id}"),
            status,
            priority: None,
            author_id: None,
            assigned_user_id: None,
            external: None,
            external_metadata: None,
            external_issue_id: Some(issue_id.to_string()),
            external_pr_id: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn issues_closed(issue_id: i64) -> WebhookEvent {
        parse_event(
            "issues",
            &format!(
                r#"{{
                    "action": "closed",
                    "issue": {{ "id": {issue_id}, "number": 42, "title": "Login broken" }}
                }}"#
            ),
        )
        .expect("parse issues.closed")
    }

    async fn harness() -> (Arc<InMemoryThreadRepository>, Arc<InMemoryUpdateRepository>, GithubIngestor)
    {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let updates = Arc::new(InMemoryUpdateRepository::new(threads.clone()));
        let ingestor = GithubIngestor::new(threads.clone(), updates.clone());
        (threads, updates, ingestor)
    }

    #[tokio::test]
    async fn issue_close_resolves_open_candidates_and_leaves_settled_ones_alone() {
        let (threads, updates, ingestor) = harness().await;

        // Scenario: issue 998 referenced by one open and one already-resolved
        // thread.
        threads
            .insert(issue_thread("T-open", "998", ThreadStatus::Open))
            .await
            .expect("insert open");
        threads
            .insert(issue_thread("T-done", "998", ThreadStatus::Resolved))
            .await
            .expect("insert resolved");

        let report = ingestor
            .handle_event(&issues_closed(998), &IngestContext::default())
            .await
            .expect("handle event");

        assert_eq!(report.resolved, vec![ThreadId("T-open".to_string())]);
        assert_eq!(report.skipped, 1);

        let open = threads
            .find_by_id(&ThreadId("T-open".to_string()))
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(open.status, ThreadStatus::Resolved);

        let audit = updates
            .list_for_thread(&ThreadId("T-open".to_string()))
            .await
            .expect("list updates");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].user_id, None, "platform-originated updates carry no user");
        assert!(audit[0].replicated.is_marked(Platform::Github), "self-mark prevents echo");
        assert!(matches!(
            &audit[0].detail,
            UpdateDetail::StatusChanged {
                old_status: ThreadStatus::Open,
                new_status: ThreadStatus::Resolved,
                source: Some(Platform::Github),
                ..
            }
        ));

        let untouched = updates
            .list_for_thread(&ThreadId("T-done".to_string()))
            .await
            .expect("list updates");
        assert!(untouched.is_empty(), "settled threads get no audit rows");
    }

    #[tokio::test]
    async fn replaying_the_same_close_produces_exactly_one_transition_and_update() {
        let (threads, updates, ingestor) = harness().await;
        threads
            .insert(issue_thread("T-replay", "998", ThreadStatus::Open))
            .await
            .expect("insert");

        let first = ingestor
            .handle_event(&issues_closed(998), &IngestContext::default())
            .await
            .expect("first delivery");
        let second = ingestor
            .handle_event(&issues_closed(998), &IngestContext::default())
            .await
            .expect("second delivery");

        assert_eq!(first.resolved.len(), 1);
        assert!(second.resolved.is_empty());
        assert_eq!(second.skipped, 1);

        let audit = updates
            .list_for_thread(&ThreadId("T-replay".to_string()))
            .await
            .expect("list updates");
        assert_eq!(audit.len(), 1, "replay must not append a second update");
    }

    #[tokio::test]
    async fn closed_threads_never_move_and_never_get_updates() {
        let (threads, updates, ingestor) = harness().await;
        threads
            .insert(issue_thread("T-closed", "998", ThreadStatus::Closed))
            .await
            .expect("insert");

        let report = ingestor
            .handle_event(&issues_closed(998), &IngestContext::default())
            .await
            .expect("handle event");

        assert!(report.resolved.is_empty());
        let thread = threads
            .find_by_id(&ThreadId("T-closed".to_string()))
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(thread.status, ThreadStatus::Closed);
        assert!(updates
            .list_for_thread(&ThreadId("T-closed".to_string()))
            .await
            .expect("list")
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_issue_is_a_logged_no_op() {
        let (_threads, _updates, ingestor) = harness().await;

        let report = ingestor
            .handle_event(&issues_closed(12345), &IngestContext::default())
            .await
            .expect("handle event");

        assert_eq!(report, super::IngestReport::default());
    }

    #[tokio::test]
    async fn merged_pull_request_resolves_linked_threads() {
        let (threads, _updates, ingestor) = harness().await;

        let mut thread = issue_thread("T-pr", "unused", ThreadStatus::InProgress);
        thread.external_issue_id = None;
        thread.external_pr_id = Some("555".to_string());
        thread.external = Some(ExternalRef { id: "555".to_string(), origin: Platform::Github });
        threads.insert(thread).await.expect("insert");

        let event = parse_event(
            "pull_request",
            r#"{
                "action": "closed",
                "pull_request": { "id": 555, "number": 7, "title": "Fix login", "merged": true }
            }"#,
        )
        .expect("parse");

        let report =
            ingestor.handle_event(&event, &IngestContext::default()).await.expect("handle");
        assert_eq!(report.resolved, vec![ThreadId("T-pr".to_string())]);
    }

    #[tokio::test]
    async fn catch_all_events_do_nothing() {
        let (_threads, _updates, ingestor) = harness().await;
        let event = parse_event("push", r#"{"ref": "refs/heads/main"}"#).expect("parse");

        let report =
            ingestor.handle_event(&event, &IngestContext::default()).await.expect("handle");
        assert_eq!(report, super::IngestReport::default());
    }
}
