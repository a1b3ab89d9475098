//! Inbound GitHub webhook surface. The signing check is the only guard that
//! is allowed to reject a delivery: after it passes, every outcome answers
//! 2xx, because platforms suspend endpoints that keep failing deliveries.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use tether_github::ingest::{GithubIngestor, IngestContext};
use tether_github::signature::verify_signature;
use tether_github::webhook::parse_event;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Clone)]
pub struct WebhookState {
    ingestor: Arc<GithubIngestor>,
    webhook_secret: Option<SecretString>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub resolved: usize,
}

#[derive(Debug, Serialize)]
struct WebhookError {
    error: String,
}

pub fn router(ingestor: Arc<GithubIngestor>, webhook_secret: Option<SecretString>) -> Router {
    Router::new()
        .route("/api/v1/webhooks/github", post(github_webhook))
        .with_state(WebhookState { ingestor, webhook_secret })
}

async fn github_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<WebhookError>)> {
    let Some(secret) = &state.webhook_secret else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(WebhookError { error: "github webhook secret is not configured".to_string() }),
        ));
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    if let Err(error) = verify_signature(secret.expose_secret(), &body, signature) {
        // Rejected at the boundary; nothing reaches the ingestor.
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(WebhookError { error: error.to_string() }),
        ));
    }

    let delivery_id = headers
        .get(DELIVERY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown-delivery")
        .to_string();
    let Some(event_name) = headers.get(EVENT_HEADER).and_then(|value| value.to_str().ok()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(WebhookError { error: "missing event name header".to_string() }),
        ));
    };

    let raw_body = String::from_utf8_lossy(&body);
    let event = match parse_event(event_name, &raw_body) {
        Ok(event) => event,
        Err(error) => {
            // Signed but unparseable: log it and tell the platform we took
            // it, or it will disable the hook after enough retries.
            warn!(
                event_name = "ingress.github.unparseable_delivery",
                correlation_id = %delivery_id,
                delivered_event = %event_name,
                error = %error,
                "discarding unparseable webhook delivery"
            );
            return Ok(Json(WebhookResponse { status: "ignored", resolved: 0 }));
        }
    };

    let ctx = IngestContext { delivery_id: delivery_id.clone() };
    match state.ingestor.handle_event(&event, &ctx).await {
        Ok(report) => {
            info!(
                event_name = "ingress.github.delivery_processed",
                correlation_id = %delivery_id,
                delivered_event = event.name(),
                resolved = report.resolved.len(),
                skipped = report.skipped,
                "processed webhook delivery"
            );
            Ok(Json(WebhookResponse { status: "ok", resolved: report.resolved.len() }))
        }
        Err(error) => {
            warn!(
                event_name = "ingress.github.delivery_failed",
                correlation_id = %delivery_id,
                delivered_event = event.name(),
                error = %error,
                "delivery processing failed; acknowledged anyway"
            );
            Ok(Json(WebhookResponse { status: "error_logged", resolved: 0 }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use tower::util::ServiceExt;

    use tether_core::domain::thread::{Thread, ThreadId, ThreadStatus};
    use tether_db::repositories::{
        InMemoryThreadRepository, InMemoryUpdateRepository, ThreadRepository, UpdateRepository,
    };
    use tether_github::ingest::GithubIngestor;
    use tether_github::signature::sign_body;

    use super::router;

    const SECRET: &str = "hook-secret";

    fn issues_closed_body(issue_id: i64) -> String {
        format!(
            r#"{{
                "action": "closed",
                "issue": {{ "id": {issue_id}, "number": 42, "title": "Login broken" }}
            }}"#
        )
    }

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

    struct Harness {
        threads: Arc<InMemoryThreadRepository>,
        updates: Arc<InMemoryUpdateRepository>,
        router: axum::Router,
    }

    fn harness(secret: Option<&str>) -> Harness {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let updates = Arc::new(InMemoryUpdateRepository::new(threads.clone()));
        let ingestor = Arc::new(GithubIngestor::new(threads.clone(), updates.clone()));
        let router = router(ingestor, secret.map(|secret| secret.to_string().into()));
        Harness { threads, updates, router }
    }

    fn signed_request(body: &str, event: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/github")
            .header("x-hub-signature-256", sign_body(SECRET, body.as_bytes()))
            .header("x-github-event", event)
            .header("x-github-delivery", "delivery-1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_ingest() {
        let harness = harness(Some(SECRET));
        harness
            .threads
            .insert(issue_thread("T-sig", "998", ThreadStatus::Open))
            .await
            .expect("seed");

        let body = issues_closed_body(998);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/github")
            .header("x-hub-signature-256", "sha256=0000")
            .header("x-github-event", "issues")
            .body(Body::from(body))
            .expect("request");

        let response = harness.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let thread = harness
            .threads
            .find_by_id(&ThreadId("T-sig".to_string()))
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(thread.status, ThreadStatus::Open, "rejected delivery must not mutate");
    }

    #[tokio::test]
    async fn signed_issue_close_resolves_and_acks() {
        let harness = harness(Some(SECRET));
        harness
            .threads
            .insert(issue_thread("T-ok", "998", ThreadStatus::Open))
            .await
            .expect("seed");

        let response = harness
            .router
            .oneshot(signed_request(&issues_closed_body(998), "issues"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let thread = harness
            .threads
            .find_by_id(&ThreadId("T-ok".to_string()))
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(thread.status, ThreadStatus::Resolved);

        let audit = harness
            .updates
            .list_for_thread(&ThreadId("T-ok".to_string()))
            .await
            .expect("list updates");
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn unparseable_but_signed_delivery_still_gets_2xx() {
        let harness = harness(Some(SECRET));

        let body = r#"{"action": "closed"}"#;
        let response =
            harness.router.oneshot(signed_request(body, "issues")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn catch_all_events_are_acknowledged() {
        let harness = harness(Some(SECRET));

        let response = harness
            .router
            .oneshot(signed_request(r#"{"ref": "refs/heads/main"}"#, "push"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_secret_configuration_is_surfaced() {
        let harness = harness(None);

        let response = harness
            .router
            .oneshot(signed_request(&issues_closed_body(998), "issues"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
