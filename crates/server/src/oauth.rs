//! Slack app-install flow: the connect endpoint parks a disabled integration
//! row holding a CSRF token, and the OAuth callback validates that token,
//! exchanges the code, and flips the row to enabled. This is the single
//! cross-domain token handoff the engine owns; everything else about
//! sessions and auth lives elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Json, Redirect},
    routing::get,
    Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tether_core::domain::integration::{
    generate_csrf_token, InstallState, Installation, Integration, IntegrationConfig, IntegrationId,
};
use tether_core::domain::thread::Platform;
use tether_db::repositories::{IntegrationRepository, RepositoryError};

const CALLBACK_PATH: &str = "/api/v1/slack/oauth/callback";
const AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";
const ACCESS_URL: &str = "https://slack.com/api/oauth.v2.access";
const OAUTH_SCOPES: &str = "chat:write,channels:history,channels:read";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("malformed state parameter")]
    InvalidState,
    #[error("authorization code missing from callback")]
    MissingCode,
    #[error("no slack integration row for this organization")]
    IntegrationNotFound,
    #[error("csrf token does not match the pending integration")]
    CsrfTokenMismatch,
    #[error("platform denied the authorization: {0}")]
    Denied(String),
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl OAuthError {
    /// Stable code carried back to the settings page as `?error=`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState => "INVALID_STATE",
            Self::MissingCode => "MISSING_CODE",
            Self::IntegrationNotFound => "INTEGRATION_NOT_FOUND",
            Self::CsrfTokenMismatch => "CSRF_TOKEN_MISMATCH",
            Self::Denied(_) => "OAUTH_DENIED",
            Self::ExchangeFailed(_) => "OAUTH_EXCHANGE_FAILED",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
        }
    }
}

impl From<RepositoryError> for OAuthError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Seam over the `oauth.v2.access` code exchange so the callback flow is
/// testable without the platform.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Installation, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct OAuthAccessResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    bot_user_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    team: Option<TeamRef>,
    #[serde(default)]
    enterprise: Option<TeamRef>,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: String,
}

pub struct SlackTokenExchanger {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
}

impl SlackTokenExchanger {
    pub fn new(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
        Self { http: reqwest::Client::new(), client_id, client_secret, redirect_uri }
    }
}

#[async_trait]
impl TokenExchanger for SlackTokenExchanger {
    async fn exchange(&self, code: &str) -> Result<Installation, OAuthError> {
        let response = self
            .http
            .post(ACCESS_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|error| OAuthError::ExchangeFailed(error.to_string()))?;

        let payload: OAuthAccessResponse = response
            .json()
            .await
            .map_err(|error| OAuthError::ExchangeFailed(error.to_string()))?;

        if !payload.ok {
            return Err(OAuthError::ExchangeFailed(
                payload.error.unwrap_or_else(|| "unknown platform error".to_string()),
            ));
        }

        let team_id = payload
            .team
            .map(|team| team.id)
            .ok_or_else(|| OAuthError::ExchangeFailed("response carried no team id".to_string()))?;
        let bot_token = payload.access_token.ok_or_else(|| {
            OAuthError::ExchangeFailed("response carried no access token".to_string())
        })?;
        let bot_user_id = payload.bot_user_id.ok_or_else(|| {
            OAuthError::ExchangeFailed("response carried no bot user id".to_string())
        })?;

        Ok(Installation {
            team_id,
            enterprise_id: payload.enterprise.map(|enterprise| enterprise.id),
            bot_token,
            bot_user_id,
            scopes: payload
                .scope
                .map(|scope| scope.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            installed_at: Utc::now(),
        })
    }
}

/// Stand-in used when no OAuth client credentials are configured; the
/// connect endpoint already refuses before any exchange can happen.
pub struct UnconfiguredExchanger;

#[async_trait]
impl TokenExchanger for UnconfiguredExchanger {
    async fn exchange(&self, _code: &str) -> Result<Installation, OAuthError> {
        Err(OAuthError::ExchangeFailed("slack oauth client is not configured".to_string()))
    }
}

#[derive(Clone)]
pub struct OAuthRouterState {
    integrations: Arc<dyn IntegrationRepository>,
    exchanger: Arc<dyn TokenExchanger>,
    client_id: Option<String>,
    redirect_base_url: String,
}

pub fn router(
    integrations: Arc<dyn IntegrationRepository>,
    exchanger: Arc<dyn TokenExchanger>,
    client_id: Option<String>,
    redirect_base_url: Option<String>,
) -> Router {
    Router::new()
        .route("/api/v1/slack/connect", get(connect))
        .route(CALLBACK_PATH, get(callback))
        .with_state(OAuthRouterState {
            integrations,
            exchanger,
            client_id,
            redirect_base_url: redirect_base_url.unwrap_or_default(),
        })
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    organization_id: String,
}

#[derive(Debug, Serialize)]
struct ConnectResponse {
    authorization_url: String,
    state: String,
}

#[derive(Debug, Serialize)]
struct ConnectError {
    error: String,
}

async fn connect(
    State(state): State<OAuthRouterState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Json<ConnectResponse>, (StatusCode, Json<ConnectError>)> {
    let Some(client_id) = &state.client_id else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ConnectError { error: "slack oauth client is not configured".to_string() }),
        ));
    };

    let csrf_token = generate_csrf_token();
    let install_state = InstallState {
        organization_id: query.organization_id.clone(),
        csrf_token: csrf_token.clone(),
    };

    let now = Utc::now();
    let integration = Integration {
        id: IntegrationId::generate(),
        organization_id: query.organization_id,
        kind: Platform::Slack,
        enabled: false,
        config: IntegrationConfig {
            csrf_token: Some(csrf_token),
            ..IntegrationConfig::default()
        },
        created_at: now,
        updated_at: now,
    };
    state.integrations.insert(integration.clone()).await.map_err(|error| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ConnectError { error: format!("could not create integration row: {error}") }),
        )
    })?;

    info!(
        event_name = "oauth.slack.connect_started",
        correlation_id = %integration.id.0,
        organization_id = %integration.organization_id,
        "created pending slack integration"
    );

    let encoded_state = install_state.encode();
    let authorization_url = format!(
        "{AUTHORIZE_URL}?client_id={client_id}&scope={OAUTH_SCOPES}&state={encoded_state}&redirect_uri={base}{CALLBACK_PATH}",
        base = state.redirect_base_url,
    );

    Ok(Json(ConnectResponse { authorization_url, state: encoded_state }))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn callback(
    State(state): State<OAuthRouterState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    match complete_install(&state, query).await {
        Ok(organization_id) => {
            info!(
                event_name = "oauth.slack.install_completed",
                correlation_id = %organization_id,
                "slack integration enabled"
            );
            Redirect::to(&format!(
                "{}/settings/integrations?connected=slack",
                state.redirect_base_url
            ))
        }
        Err(error) => {
            warn!(
                event_name = "oauth.slack.install_failed",
                error = %error,
                error_code = error.code(),
                "slack install callback failed"
            );
            Redirect::to(&format!(
                "{}/settings/integrations?error={}",
                state.redirect_base_url,
                error.code()
            ))
        }
    }
}

async fn complete_install(
    state: &OAuthRouterState,
    query: CallbackQuery,
) -> Result<String, OAuthError> {
    if let Some(error) = query.error {
        return Err(OAuthError::Denied(error));
    }

    let raw_state = query.state.ok_or(OAuthError::InvalidState)?;
    let install_state =
        InstallState::parse(&raw_state).map_err(|_| OAuthError::InvalidState)?;
    let code = query.code.ok_or(OAuthError::MissingCode)?;

    let mut integration = state
        .integrations
        .find_latest(&install_state.organization_id, Platform::Slack)
        .await?
        .ok_or(OAuthError::IntegrationNotFound)?;

    if integration.config.csrf_token.as_deref() != Some(install_state.csrf_token.as_str()) {
        return Err(OAuthError::CsrfTokenMismatch);
    }

    let installation = state.exchanger.exchange(&code).await?;

    integration.config.team_id = Some(installation.team_id.clone());
    integration.config.access_token = Some(installation.bot_token.clone());
    integration.config.installation = Some(installation);
    integration.config.csrf_token = None;
    integration.enabled = true;
    integration.updated_at = Utc::now();
    state.integrations.save(integration.clone()).await?;

    Ok(integration.organization_id)
}
