use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::thread::Platform;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationId(pub String);

impl IntegrationId {
    pub fn generate() -> Self {
        Self(format!("INT-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Per-organization, per-platform connection record. A row is created
/// disabled when the connect flow starts (holding only a CSRF token) and
/// flipped to enabled once the platform install callback validates it.
/// At most one enabled row exists per (organization_id, kind).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub organization_id: String,
    pub kind: Platform,
    pub enabled: bool,
    pub config: IntegrationConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The config column, as an explicit record instead of the original's
/// free-form JSON blob. Every field is optional; the struct round-trips
/// whatever subset a given platform populates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfill: Option<BackfillProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repos: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_repos: Option<Vec<String>>,
}

impl IntegrationConfig {
    pub fn channel_selected(&self, channel_id: &str) -> bool {
        self.selected_channels
            .as_ref()
            .map(|channels| channels.iter().any(|channel| channel == channel_id))
            .unwrap_or(false)
    }
}

/// Platform-issued installation grant (Slack app install), stored inside the
/// integration config keyed by team id so the SDK installation-store contract
/// can be satisfied without a dedicated table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_id: Option<String>,
    pub bot_token: String,
    pub bot_user_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillProgress {
    pub processed: u64,
    pub total: u64,
}

/// OAuth `state` parameter carried through the platform install redirect:
/// `<organization_id>_<csrf_token>`. Organization ids never contain `_`;
/// tokens may, so the split is on the first separator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallState {
    pub organization_id: String,
    pub csrf_token: String,
}

impl InstallState {
    pub fn encode(&self) -> String {
        format!("{}_{}", self.organization_id, self.csrf_token)
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let (organization_id, csrf_token) = raw.split_once('_').ok_or_else(|| {
            DomainError::InvariantViolation(format!("malformed install state parameter `{raw}`"))
        })?;
        if organization_id.is_empty() || csrf_token.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "malformed install state parameter `{raw}`"
            )));
        }

        Ok(Self {
            organization_id: organization_id.to_string(),
            csrf_token: csrf_token.to_string(),
        })
    }
}

pub fn generate_csrf_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::{generate_csrf_token, InstallState, Installation, IntegrationConfig};
    use chrono::{TimeZone, Utc};

    #[test]
    fn config_round_trips_populated_subset() {
        let config = IntegrationConfig {
            team_id: Some("T0ABCDEF".to_string()),
            installation: Some(Installation {
                team_id: "T0ABCDEF".to_string(),
                enterprise_id: None,
                bot_token: "xoxb-install".to_string(),
                bot_user_id: "B0BOT".to_string(),
                scopes: vec!["chat:write".to_string()],
                installed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            }),
            selected_channels: Some(vec!["C0SUPPORT".to_string()]),
            ..IntegrationConfig::default()
        };

        let raw = serde_json::to_string(&config).expect("serialize");
        let parsed: IntegrationConfig = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, config);
        assert!(!raw.contains("csrf_token"), "absent fields stay out of the persisted JSON");
    }

    #[test]
    fn channel_selection_defaults_to_rejecting_everything() {
        let config = IntegrationConfig::default();
        assert!(!config.channel_selected("C0ANY"));

        let config = IntegrationConfig {
            selected_channels: Some(vec!["C0SUPPORT".to_string()]),
            ..IntegrationConfig::default()
        };
        assert!(config.channel_selected("C0SUPPORT"));
        assert!(!config.channel_selected("C0RANDOM"));
    }

    #[test]
    fn install_state_round_trips_and_splits_on_first_separator() {
        let state = InstallState {
            organization_id: "org-42".to_string(),
            csrf_token: "tok_with_underscores".to_string(),
        };

        let parsed = InstallState::parse(&state.encode()).expect("parse");
        assert_eq!(parsed, state);
    }

    #[test]
    fn install_state_rejects_malformed_values() {
        assert!(InstallState::parse("no-separator").is_err());
        assert!(InstallState::parse("_tokenonly").is_err());
        assert!(InstallState::parse("orgonly_").is_err());
    }

    #[test]
    fn csrf_tokens_are_long_and_distinct() {
        let first = generate_csrf_token();
        let second = generate_csrf_token();
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }
}
