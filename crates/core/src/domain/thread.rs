use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::author::AuthorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn generate() -> Self {
        Self(format!("T-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Github,
    Discord,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Github => "github",
            Self::Discord => "discord",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "slack" => Some(Self::Slack),
            "github" => Some(Self::Github),
            "discord" => Some(Self::Discord),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread lifecycle status, persisted as its integer discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadStatus {
    Open = 0,
    InProgress = 1,
    Resolved = 2,
    Closed = 3,
    Duplicate = 4,
}

impl ThreadStatus {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Open),
            1 => Some(Self::InProgress),
            2 => Some(Self::Resolved),
            3 => Some(Self::Closed),
            4 => Some(Self::Duplicate),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
            Self::Duplicate => "Duplicate",
        }
    }
}

/// External identity of an imported thread. The platform-native id and the
/// origin tag are set together or not at all; holding them as one value makes
/// the half-set state unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub id: String,
    pub origin: Platform,
}

/// Opaque-in-the-original platform metadata, modeled as an explicit record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub organization_id: String,
    pub name: String,
    pub status: ThreadStatus,
    pub priority: Option<i64>,
    pub author_id: Option<AuthorId>,
    pub assigned_user_id: Option<String>,
    pub external: Option<ExternalRef>,
    pub external_metadata: Option<ExternalMetadata>,
    pub external_issue_id: Option<String>,
    pub external_pr_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// User-driven transitions move forward along the lattice; Duplicate is a
    /// side-branch reachable from any state.
    pub fn can_transition_to(&self, next: ThreadStatus) -> bool {
        if next == ThreadStatus::Duplicate {
            return self.status != ThreadStatus::Duplicate;
        }
        if self.status == ThreadStatus::Duplicate {
            return false;
        }
        next.as_i64() > self.status.as_i64()
    }

    pub fn transition_to(&mut self, next: ThreadStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    pub fn origin(&self) -> Option<Platform> {
        self.external.as_ref().map(|external| external.origin)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ExternalRef, Platform, Thread, ThreadId, ThreadStatus};

    fn thread(status: ThreadStatus) -> Thread {
        Thread {
            id: ThreadId("T-1".to_string()),
            organization_id: "org-1".to_string(),
            name: "login broken on mobile".to_string(),
            status,
            priority: None,
            author_id: None,
            assigned_user_id: None,
            external: Some(ExternalRef {
                id: "1730000000.1000".to_string(),
                origin: Platform::Slack,
            }),
            external_metadata: None,
            external_issue_id: None,
            external_pr_id: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn allows_forward_lattice_transition() {
        let mut thread = thread(ThreadStatus::Open);
        thread.transition_to(ThreadStatus::InProgress).expect("open -> in progress");
        thread.transition_to(ThreadStatus::Resolved).expect("in progress -> resolved");
        assert_eq!(thread.status, ThreadStatus::Resolved);
    }

    #[test]
    fn blocks_backward_transition() {
        let mut thread = thread(ThreadStatus::Closed);
        let error = thread.transition_to(ThreadStatus::Open).expect_err("closed -> open");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidStatusTransition { .. }
        ));
    }

    #[test]
    fn duplicate_is_reachable_from_any_state_but_terminal() {
        let mut thread = thread(ThreadStatus::Closed);
        thread.transition_to(ThreadStatus::Duplicate).expect("closed -> duplicate");

        let error = thread.transition_to(ThreadStatus::Open).expect_err("duplicate is terminal");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidStatusTransition { .. }
        ));
    }

    #[test]
    fn status_integer_round_trip_matches_lattice() {
        for status in [
            ThreadStatus::Open,
            ThreadStatus::InProgress,
            ThreadStatus::Resolved,
            ThreadStatus::Closed,
            ThreadStatus::Duplicate,
        ] {
            assert_eq!(ThreadStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(ThreadStatus::from_i64(9), None);
    }

    #[test]
    fn platform_tags_round_trip() {
        for platform in [Platform::Slack, Platform::Github, Platform::Discord] {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::parse("jira"), None);
    }
}
