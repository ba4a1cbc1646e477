use std::sync::Arc;
use std::time::Duration;

use tally_core::clock::{Clock, SystemClock};
use tally_core::config::{AppConfig, ConfigError};
use tally_core::counting::CountingEngine;
use tally_core::domain::member::ChannelId;
use tally_core::leaderboard::LeaderboardAggregator;
use tally_core::store::{SharedCounterStore, StoreError};
use tally_slack::announcer::ScheduledAnnouncer;
use tally_slack::commands::LeaderboardQueryService;
use tally_slack::events::{counting_dispatcher, EventDispatcher};
use tally_slack::notify::{Notifier, NotifyError, SlackWebClient};
use tally_store::open_store;
use thiserror::Error;
use tracing::info;

const SLACK_API_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Application {
    pub config: AppConfig,
    pub store: SharedCounterStore,
    pub dispatcher: Arc<EventDispatcher>,
    pub announcer: Option<ScheduledAnnouncer>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("counter store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("slack client setup failed: {0}")]
    Notifier(#[from] NotifyError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        channel_id = %config.game.channel_id,
        events = config.events.events().len(),
        "starting application bootstrap"
    );

    let store = open_store(&config.store).await?;
    info!(
        event_name = "system.bootstrap.store_connected",
        correlation_id = "bootstrap",
        "counter store ready"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(SlackWebClient::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
        SLACK_API_TIMEOUT,
    )?);

    Ok(assemble(config, store, notifier, Arc::new(SystemClock)))
}

/// Wires engine, queries, dispatcher and announcer around already-open adapters.
pub fn assemble(
    config: AppConfig,
    store: SharedCounterStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> Application {
    let calendar = Arc::new(config.events.clone());
    let engine = Arc::new(CountingEngine::new(
        store.clone(),
        calendar.clone(),
        clock.clone(),
        config.counting_rules(),
    ));
    let queries = LeaderboardQueryService::new(
        LeaderboardAggregator::new(store.clone()),
        calendar,
        clock.clone(),
        config.game.leaderboard_limit,
    );
    let dispatcher = Arc::new(counting_dispatcher(engine, notifier.clone(), queries));

    let announcer = config.announcer.enabled.then(|| {
        ScheduledAnnouncer::new(
            LeaderboardAggregator::new(store.clone()),
            notifier,
            clock,
            ChannelId(config.game.channel_id.clone()),
            Duration::from_secs(config.announcer.interval_secs),
        )
    });

    Application { config, store, dispatcher, announcer }
}

#[cfg(test)]
mod tests {
    use tally_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use tally_core::store::CounterStore;

    use super::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(store_url: &str, token: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                store_url: Some(store_url.to_string()),
                slack_bot_token: Some(token.to_string()),
                channel_id: Some("CCOUNT".to_string()),
                announcer_enabled: Some(false),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_invalid_bot_token() {
        let result = bootstrap(overrides("memory://", "xapp-wrong-kind")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_sqlite_store_and_both_handlers() {
        let app = bootstrap(overrides("sqlite::memory:", "xoxb-test"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.dispatcher.handler_count(), 2);
        assert!(app.announcer.is_none(), "announcer disabled by override");
        app.store.ping().await.expect("store reachable");
    }

    #[tokio::test]
    async fn bootstrap_keeps_announcer_when_enabled() {
        let mut options = overrides("memory://", "xoxb-test");
        options.overrides.announcer_enabled = Some(true);

        let app = bootstrap(options).await.expect("bootstrap");

        assert!(app.announcer.is_some());
    }
}
