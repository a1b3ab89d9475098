//! Typed webhook payloads and the explicit event enum the ingest layer
//! dispatches on. Parsing is tolerant: unknown event names and actions fall
//! into `Other`, which the caller logs and acknowledges.

use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub merged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IssuesPayload {
    pub action: String,
    pub issue: Issue,
    #[serde(default)]
    pub repository: Option<Repository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullRequestPayload {
    pub action: String,
    pub pull_request: PullRequest,
    #[serde(default)]
    pub repository: Option<Repository>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    IssuesClosed(IssuesPayload),
    PullRequestClosed(PullRequestPayload),
    Other { event: String, action: Option<String> },
}

impl WebhookEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::IssuesClosed(_) => "issues.closed",
            Self::PullRequestClosed(_) => "pull_request.closed",
            Self::Other { event, .. } => event,
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookParseError {
    #[error("malformed `{event}` payload: {source}")]
    MalformedPayload { event: String, source: serde_json::Error },
}

/// Map a delivery's `X-GitHub-Event` name plus body onto the event enum.
/// Only consumed (event, action) pairs get a typed variant; the rest are
/// normalized into `Other` so the caller's catch-all arm can log them.
pub fn parse_event(event_name: &str, body: &str) -> Result<WebhookEvent, WebhookParseError> {
    match event_name {
        "issues" => {
            let payload: IssuesPayload =
                serde_json::from_str(body).map_err(|source| WebhookParseError::MalformedPayload {
                    event: event_name.to_string(),
                    source,
                })?;
            if payload.action == "closed" {
                Ok(WebhookEvent::IssuesClosed(payload))
            } else {
                Ok(WebhookEvent::Other {
                    event: event_name.to_string(),
                    action: Some(payload.action),
                })
            }
        }
        "pull_request" => {
            let payload: PullRequestPayload =
                serde_json::from_str(body).map_err(|source| WebhookParseError::MalformedPayload {
                    event: event_name.to_string(),
                    source,
                })?;
            if payload.action == "closed" {
                Ok(WebhookEvent::PullRequestClosed(payload))
            } else {
                Ok(WebhookEvent::Other {
                    event: event_name.to_string(),
                    action: Some(payload.action),
                })
            }
        }
        other => {
            let action = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|value| value.get("action").and_then(|action| action.as_str()).map(str::to_string));
            Ok(WebhookEvent::Other { event: other.to_string(), action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_event, WebhookEvent};

    #[test]
    fn issues_closed_gets_a_typed_variant() {
        let event = parse_event(
            "issues",
            r#"{
                "action": "closed",
                "issue": { "id": 998, "number": 42, "title": "Login broken", "state": "closed" },
                "repository": { "full_name": "acme/app" }
            }"#,
        )
        .expect("parse");

        let WebhookEvent::IssuesClosed(payload) = event else {
            panic!("expected issues.closed, got {event:?}");
        };
        assert_eq!(payload.issue.id, 998);
        assert_eq!(payload.issue.number, 42);
        assert_eq!(payload.repository.map(|repo| repo.full_name).as_deref(), Some("acme/app"));
    }

    #[test]
    fn merged_pull_request_arrives_as_closed_with_merged_flag() {
        let event = parse_event(
            "pull_request",
            r#"{
                "action": "closed",
                "pull_request": { "id": 555, "number": 7, "title": "Fix login", "merged": true }
            }"#,
        )
        .expect("parse");

        let WebhookEvent::PullRequestClosed(payload) = event else {
            panic!("expected pull_request.closed, got {event:?}");
        };
        assert!(payload.pull_request.merged);
    }

    #[test]
    fn unconsumed_actions_and_events_normalize_to_other() {
        let reopened = parse_event(
            "issues",
            r#"{
                "action": "reopened",
                "issue": { "id": 998, "number": 42, "title": "Login broken" }
            }"#,
        )
        .expect("parse");
        assert_eq!(
            reopened,
            WebhookEvent::Other { event: "issues".to_string(), action: Some("reopened".to_string()) }
        );

        let push = parse_event("push", r#"{"ref": "refs/heads/main"}"#).expect("parse");
        assert_eq!(push, WebhookEvent::Other { event: "push".to_string(), action: None });
    }

    #[test]
    fn malformed_consumed_payload_is_an_error() {
        let result = parse_event("issues", r#"{"action": "closed"}"#);
        assert!(result.is_err());
    }
}
