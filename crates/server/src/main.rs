mod bootstrap;
mod health;
mod oauth;
mod webhooks;

use std::time::Duration;

use anyhow::Result;
use tether_core::config::{AppConfig, LoadOptions};
use tracing::{error, info};

fn init_logging(config: &AppConfig) {
    use tether_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let api_router = webhooks::router(
        app.github_ingestor.clone(),
        app.config.github.webhook_secret.clone(),
    )
    .merge(oauth::router(
        app.integrations.clone(),
        app.token_exchanger.clone(),
        app.config.slack.client_id.clone(),
        app.config.slack.redirect_base_url.clone(),
    ));

    let api_address =
        format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&api_address).await?;
    info!(
        event_name = "system.server.api_started",
        correlation_id = "bootstrap",
        bind_address = %api_address,
        "webhook and oauth endpoints started"
    );
    tokio::spawn(async move {
        if let Err(serve_error) = axum::serve(listener, api_router).await {
            error!(
                event_name = "system.server.api_error",
                correlation_id = "bootstrap",
                error = %serve_error,
                "api server terminated unexpectedly"
            );
        }
    });

    let relay = app.relay.clone();
    let poll_interval = Duration::from_secs(app.config.relay.poll_interval_secs);
    tokio::spawn(async move {
        relay.run(poll_interval).await;
    });

    info!(
        event_name = "system.server.slack_transport_mode",
        transport_mode = if app.slack_runner.is_noop_transport() { "noop" } else { "socket" },
        correlation_id = "bootstrap",
        "slack runner transport mode initialized"
    );
    let _ = &app.installation_store;
    app.slack_runner.start().await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "tether-server started"
    );
    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tether-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
