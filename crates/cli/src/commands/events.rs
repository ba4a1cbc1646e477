use chrono::{SecondsFormat, Utc};
use tally_core::leaderboard::{LeaderboardAggregator, Scope};
use tally_store::open_store;

use crate::commands::leaderboard::render_standings;
use crate::commands::{prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("events") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let running = config.events.running_at(Utc::now());
    if running.is_empty() {
        return CommandResult::success("events", "no counting events are running right now");
    }

    let limit = config.game.leaderboard_limit;
    let result = runtime.block_on(async {
        let store = open_store(&config.store)
            .await
            .map_err(|error| ("store_connectivity", error.to_string(), 4u8))?;
        let aggregator = LeaderboardAggregator::new(store);

        let mut sections = Vec::with_capacity(running.len());
        for event in &running {
            let scope = Scope::Event(event.name.clone());
            let entries = aggregator
                .top(&scope, limit)
                .await
                .map_err(|error| ("store_query", error.to_string(), 5u8))?;
            sections.push(format!(
                "{}\n  ends {}",
                render_standings(&scope, &entries),
                event.end.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        Ok::<_, (&'static str, String, u8)>(sections)
    });

    match result {
        Ok(sections) => CommandResult::success("events", sections.join("\n")),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("events", error_class, message, exit_code)
        }
    }
}
