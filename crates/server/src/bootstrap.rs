use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use tether_core::config::{AppConfig, ConfigError, LoadOptions};
use tether_db::repositories::{
    IntegrationRepository, SqlAuthorRepository, SqlIntegrationRepository, SqlMessageRepository,
    SqlRelayCursorRepository, SqlThreadRepository, SqlUpdateRepository,
};
use tether_db::{connect_with_settings, migrations, DbPool};
use tether_github::ingest::GithubIngestor;
use tether_relay::RelayWorker;
use tether_slack::events::{EventDispatcher, MessageEventHandler};
use tether_slack::ingest::SlackIngestor;
use tether_slack::install::InstallationStore;
use tether_slack::outbound::{ChatClient, NoopChatClient};
use tether_slack::socket::SocketModeRunner;

use crate::oauth::{SlackTokenExchanger, TokenExchanger, UnconfiguredExchanger};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub slack_runner: SocketModeRunner,
    pub relay: Arc<RelayWorker>,
    pub github_ingestor: Arc<GithubIngestor>,
    pub integrations: Arc<dyn IntegrationRepository>,
    /// Handed to the Slack SDK wiring as its installation store.
    pub installation_store: Arc<InstallationStore>,
    pub token_exchanger: Arc<dyn TokenExchanger>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let threads = Arc::new(SqlThreadRepository::new(db_pool.clone()));
    let messages = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let updates = Arc::new(SqlUpdateRepository::new(db_pool.clone()));
    let authors = Arc::new(SqlAuthorRepository::new(db_pool.clone()));
    let integrations: Arc<dyn IntegrationRepository> =
        Arc::new(SqlIntegrationRepository::new(db_pool.clone()));
    let cursors = Arc::new(SqlRelayCursorRepository::new(db_pool.clone()));

    // The SDK-backed chat client is wired in by the deployment; the engine
    // itself ships with the inert seam, exactly like the socket transport.
    let chat: Arc<dyn ChatClient> = Arc::new(NoopChatClient);

    let slack_ingestor = SlackIngestor::new(
        threads.clone(),
        messages.clone(),
        authors,
        integrations.clone(),
        chat.clone(),
    );
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageEventHandler::new(slack_ingestor));

    let relay = Arc::new(RelayWorker::new(
        messages,
        updates.clone(),
        integrations.clone(),
        cursors,
        chat,
        config.relay.bot_username.clone(),
    ));

    let github_ingestor = Arc::new(GithubIngestor::new(threads, updates));
    let installation_store = Arc::new(InstallationStore::new(integrations.clone()));

    let token_exchanger: Arc<dyn TokenExchanger> =
        match (&config.slack.client_id, &config.slack.client_secret) {
            (Some(client_id), Some(client_secret)) => Arc::new(SlackTokenExchanger::new(
                client_id.clone(),
                client_secret.expose_secret().to_string().into(),
                format!(
                    "{}/api/v1/slack/oauth/callback",
                    config.slack.redirect_base_url.clone().unwrap_or_default()
                ),
            )),
            _ => Arc::new(UnconfiguredExchanger),
        };

    Ok(Application {
        config,
        db_pool,
        slack_runner: SocketModeRunner::default(),
        relay,
        github_ingestor,
        integrations,
        installation_store,
        token_exchanger,
    })
}
