pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Tally operator CLI",
    long_about = "Inspect configuration, check store readiness, migrate the SQLite schema, and read counting standings.",
    after_help = "Examples:\n  tally doctor --json\n  tally leaderboard --month 2026-10\n  tally events"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending SQLite migrations (no-op for Redis and in-memory stores)")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, the event calendar, and counter store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show standings for a month (default: current) or a configured event")]
    Leaderboard {
        #[arg(long, help = "Configured event name")]
        event: Option<String>,
        #[arg(long, value_name = "YYYY-MM", help = "Month to rank")]
        month: Option<String>,
        #[arg(long, help = "Number of entries to show (default: game.leaderboard_limit)")]
        limit: Option<usize>,
    },
    #[command(about = "Show standings for every running event")]
    Events,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Leaderboard { event, month, limit } => {
            commands::leaderboard::run(event, month, limit)
        }
        Command::Events => commands::events::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
