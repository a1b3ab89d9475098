use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::thread::{Platform, ThreadId, ThreadStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateId(pub String);

impl UpdateId {
    pub fn generate() -> Self {
        Self(format!("U-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    StatusChanged,
    PriorityChanged,
    AssignedChanged,
    MarkedDuplicate,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChanged => "status_changed",
            Self::PriorityChanged => "priority_changed",
            Self::AssignedChanged => "assigned_changed",
            Self::MarkedDuplicate => "marked_duplicate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "status_changed" => Some(Self::StatusChanged),
            "priority_changed" => Some(Self::PriorityChanged),
            "assigned_changed" => Some(Self::AssignedChanged),
            "marked_duplicate" => Some(Self::MarkedDuplicate),
            _ => None,
        }
    }
}

/// Per-kind snapshot of what changed. Serialized into the update row's
/// metadata column; the tag doubles as the row's kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateDetail {
    StatusChanged {
        old_status: ThreadStatus,
        new_status: ThreadStatus,
        old_label: String,
        new_label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Platform>,
    },
    PriorityChanged {
        old_priority: Option<i64>,
        new_priority: Option<i64>,
        old_label: String,
        new_label: String,
    },
    AssignedChanged {
        old_user_id: Option<String>,
        new_user_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_user_name: Option<String>,
    },
    MarkedDuplicate {
        canonical_thread_id: ThreadId,
    },
}

impl UpdateDetail {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::StatusChanged { .. } => UpdateKind::StatusChanged,
            Self::PriorityChanged { .. } => UpdateKind::PriorityChanged,
            Self::AssignedChanged { .. } => UpdateKind::AssignedChanged,
            Self::MarkedDuplicate { .. } => UpdateKind::MarkedDuplicate,
        }
    }
}

/// Acknowledgement recorded per platform once an update has been relayed to
/// it, or `Suppressed` when the update originated there and must never be
/// echoed back. JSON shape: `{"slack": "1730.0042", "github": true}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicationAck {
    Suppressed(bool),
    Delivered(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationMarkers(pub BTreeMap<Platform, ReplicationAck>);

impl ReplicationMarkers {
    pub fn none() -> Self {
        Self::default()
    }

    /// Self-mark for the platform an update originated from, preventing the
    /// relay from echoing it back to its source.
    pub fn suppressed_for(platform: Platform) -> Self {
        let mut markers = BTreeMap::new();
        markers.insert(platform, ReplicationAck::Suppressed(true));
        Self(markers)
    }

    pub fn is_marked(&self, platform: Platform) -> bool {
        self.0.contains_key(&platform)
    }

    pub fn record_delivery(&mut self, platform: Platform, external_id: impl Into<String>) {
        self.0.insert(platform, ReplicationAck::Delivered(external_id.into()));
    }
}

/// Append-only audit record of a state change on a thread. `user_id = None`
/// marks a system- or platform-originated change. Rows are never mutated
/// after insert except to set replication markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub id: UpdateId,
    pub thread_id: ThreadId,
    pub user_id: Option<String>,
    pub detail: UpdateDetail,
    pub replicated: ReplicationMarkers,
    pub created_at: DateTime<Utc>,
}

impl Update {
    pub fn kind(&self) -> UpdateKind {
        self.detail.kind()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::thread::{Platform, ThreadStatus};

    use super::{ReplicationAck, ReplicationMarkers, UpdateDetail, UpdateKind};

    #[test]
    fn detail_tag_matches_kind_column() {
        let detail = UpdateDetail::StatusChanged {
            old_status: ThreadStatus::Open,
            new_status: ThreadStatus::Resolved,
            old_label: "Open".to_string(),
            new_label: "Resolved".to_string(),
            source: Some(Platform::Github),
        };

        assert_eq!(detail.kind(), UpdateKind::StatusChanged);
        let raw = serde_json::to_string(&detail).expect("serialize");
        assert!(raw.contains("\"kind\":\"status_changed\""));
        assert!(raw.contains("\"source\":\"github\""));
    }

    #[test]
    fn markers_serialize_as_platform_keyed_map() {
        let mut markers = ReplicationMarkers::suppressed_for(Platform::Github);
        markers.record_delivery(Platform::Slack, "1730000000.0042");

        let raw = serde_json::to_string(&markers).expect("serialize");
        assert_eq!(raw, "{\"slack\":\"1730000000.0042\",\"github\":true}");

        let parsed: ReplicationMarkers = serde_json::from_str(&raw).expect("parse");
        assert!(parsed.is_marked(Platform::Github));
        assert!(parsed.is_marked(Platform::Slack));
        assert!(!parsed.is_marked(Platform::Discord));
        assert_eq!(
            parsed.0.get(&Platform::Slack),
            Some(&ReplicationAck::Delivered("1730000000.0042".to_string()))
        );
    }

    #[test]
    fn suppressed_marker_blocks_re_relay() {
        let markers = ReplicationMarkers::suppressed_for(Platform::Slack);
        assert!(markers.is_marked(Platform::Slack));
    }
}
