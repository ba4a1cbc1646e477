mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use tally_core::config::{AppConfig, LoadOptions};
use tally_slack::announcer::ScheduledAnnouncer;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use tally_core::config::LogFormat::*;
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
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let announcer = app.announcer.map(ScheduledAnnouncer::spawn);
    let listener = TcpListener::bind(&address).await?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let router = routes::router(app.dispatcher, app.store);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        announcer = announcer.is_some(),
        "tally-server listening"
    );

    tokio::select! {
        joined = &mut server => {
            if let Some(handle) = announcer {
                handle.abort();
            }
            joined??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "tally-server stopping"
    );
    if let Some(handle) = announcer {
        handle.abort();
    }
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish before the grace period"
        ),
    }

    Ok(())
}
