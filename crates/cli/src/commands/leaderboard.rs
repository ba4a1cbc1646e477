use chrono::Utc;
use tally_core::leaderboard::{LeaderboardAggregator, LeaderboardEntry, Scope};
use tally_store::open_store;

use crate::commands::{prepare, CommandResult};

pub fn run(event: Option<String>, month: Option<String>, limit: Option<usize>) -> CommandResult {
    let (config, runtime) = match prepare("leaderboard") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let limit = limit.unwrap_or(config.game.leaderboard_limit);
    if limit == 0 {
        return CommandResult::failure(
            "leaderboard",
            "invalid_argument",
            "--limit must be at least 1",
            6,
        );
    }

    let scope = match (event, month) {
        (Some(_), Some(_)) => {
            return CommandResult::failure(
                "leaderboard",
                "invalid_argument",
                "--event and --month are mutually exclusive",
                6,
            );
        }
        (Some(name), None) => {
            if config.events.find(&name).is_none() {
                return CommandResult::failure(
                    "leaderboard",
                    "unknown_event",
                    format!("no event named `{name}` is configured"),
                    6,
                );
            }
            Scope::Event(name)
        }
        (None, Some(raw)) => match parse_month(&raw) {
            Ok(scope) => scope,
            Err(message) => {
                return CommandResult::failure("leaderboard", "invalid_argument", message, 6);
            }
        },
        (None, None) => Scope::current_month(Utc::now()),
    };

    let result = runtime.block_on(async {
        let store = open_store(&config.store)
            .await
            .map_err(|error| ("store_connectivity", error.to_string(), 4u8))?;
        LeaderboardAggregator::new(store)
            .top(&scope, limit)
            .await
            .map_err(|error| ("store_query", error.to_string(), 5u8))
    });

    match result {
        Ok(entries) => CommandResult::success("leaderboard", render_standings(&scope, &entries)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("leaderboard", error_class, message, exit_code)
        }
    }
}

/// `YYYY-MM` to a monthly scope.
pub fn parse_month(raw: &str) -> Result<Scope, String> {
    let invalid = || format!("invalid month `{raw}` (expected YYYY-MM)");
    let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok(Scope::Monthly { year, month })
}

pub(crate) fn render_standings(scope: &Scope, entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return format!("counting stats for {scope}: nobody has counted yet");
    }

    let mut lines = vec![format!("counting stats for {scope}:")];
    lines.extend(
        entries
            .iter()
            .enumerate()
            .map(|(rank, entry)| format!("  {}. {} {}", rank + 1, entry.user, entry.count)),
    );
    lines.join("\n")
}
