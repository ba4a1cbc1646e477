use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use tally_core::clock::Clock;
use tally_core::domain::event::{EventCalendar, EventDefinition};
use tally_core::errors::LeaderboardError;
use tally_core::leaderboard::{LeaderboardAggregator, LeaderboardEntry, Scope};

use crate::blocks::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountingQuery {
    /// Current month's standings.
    Leaderboard,
    /// Standings for every running event.
    Events,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

/// Maps `/leaderboard` and `/events` (plus a `help` argument on either) to a query.
pub fn parse_counting_query(
    payload: &SlashCommandPayload,
) -> Result<CountingQuery, CommandParseError> {
    if payload.text.trim().eq_ignore_ascii_case("help") {
        return match payload.command.as_str() {
            "/leaderboard" | "/events" => Ok(CountingQuery::Help),
            other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
        };
    }

    match payload.command.as_str() {
        "/leaderboard" => Ok(CountingQuery::Leaderboard),
        "/events" => Ok(CountingQuery::Events),
        other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
    }
}

#[async_trait]
pub trait CountingQueryService: Send + Sync {
    async fn monthly_leaderboard(&self, correlation_id: &str) -> MessageTemplate;
    async fn running_events(&self, correlation_id: &str) -> MessageTemplate;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: CountingQueryService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(&self, query: CountingQuery, correlation_id: &str) -> MessageTemplate {
        match query {
            CountingQuery::Leaderboard => self.service.monthly_leaderboard(correlation_id).await,
            CountingQuery::Events => self.service.running_events(correlation_id).await,
            CountingQuery::Help => blocks::help_message(),
        }
    }
}

/// Answers counting queries from the live counter store.
pub struct LeaderboardQueryService {
    aggregator: LeaderboardAggregator,
    calendar: Arc<EventCalendar>,
    clock: Arc<dyn Clock>,
    limit: usize,
}

impl LeaderboardQueryService {
    pub fn new(
        aggregator: LeaderboardAggregator,
        calendar: Arc<EventCalendar>,
        clock: Arc<dyn Clock>,
        limit: usize,
    ) -> Self {
        Self { aggregator, calendar, clock, limit }
    }

    async fn event_standings<'a>(
        &self,
        running: Vec<&'a EventDefinition>,
    ) -> Result<Vec<(&'a EventDefinition, Vec<LeaderboardEntry>)>, LeaderboardError> {
        let mut standings = Vec::with_capacity(running.len());
        for event in running {
            let entries =
                self.aggregator.top(&Scope::Event(event.name.clone()), self.limit).await?;
            standings.push((event, entries));
        }
        Ok(standings)
    }
}

fn failure_message(error: LeaderboardError, scope: &str, correlation_id: &str) -> MessageTemplate {
    error!(
        event_name = "query.leaderboard.failed",
        correlation_id,
        scope,
        error = %error,
        "could not rank leaderboard"
    );
    let interface = error.into_interface(correlation_id);
    blocks::error_message(interface.user_message(), interface.correlation_id())
}

#[async_trait]
impl CountingQueryService for LeaderboardQueryService {
    async fn monthly_leaderboard(&self, correlation_id: &str) -> MessageTemplate {
        let scope = Scope::current_month(self.clock.now());
        match self.aggregator.top(&scope, self.limit).await {
            Ok(entries) => {
                info!(
                    event_name = "query.leaderboard.answered",
                    correlation_id,
                    scope = %scope,
                    entries = entries.len(),
                    "served monthly leaderboard"
                );
                blocks::monthly_leaderboard_message(&scope, &entries)
            }
            Err(error) => failure_message(error, &scope.to_string(), correlation_id),
        }
    }

    async fn running_events(&self, correlation_id: &str) -> MessageTemplate {
        let running = self.calendar.running_at(self.clock.now());
        match self.event_standings(running).await {
            Ok(standings) => {
                info!(
                    event_name = "query.events.answered",
                    correlation_id,
                    running = standings.len(),
                    "served event leaderboards"
                );
                blocks::event_leaderboard_message(&standings)
            }
            Err(error) => failure_message(error, "events", correlation_id),
        }
    }
}
