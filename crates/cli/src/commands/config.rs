use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tally_core::config::{AppConfig, LoadOptions};
use tally_store::redact_url;
use toml::Value;

/// A rendered config field: dotted key, printable value, env vars that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    let configured = config.events.events().len();
    lines.push(format!("- events = {configured} configured"));
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "store.url",
            value: redact_url(&config.store.url),
            env_keys: &["TALLY_STORE_URL", "REDIS_URL"],
        },
        Field {
            key: "store.timeout_ms",
            value: config.store.timeout_ms.to_string(),
            env_keys: &["TALLY_STORE_TIMEOUT_MS"],
        },
        Field {
            key: "store.max_connections",
            value: config.store.max_connections.to_string(),
            env_keys: &["TALLY_STORE_MAX_CONNECTIONS"],
        },
        Field {
            key: "slack.bot_token",
            value: redact_token(config.slack.bot_token.expose_secret()),
            env_keys: &["TALLY_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        },
        Field {
            key: "slack.api_base_url",
            value: config.slack.api_base_url.clone(),
            env_keys: &["TALLY_SLACK_API_BASE_URL"],
        },
        Field {
            key: "game.channel_id",
            value: config.game.channel_id.clone(),
            env_keys: &["TALLY_CHANNEL_ID", "SLACK_CHANNEL_ID"],
        },
        Field {
            key: "game.ignored_senders",
            value: config.game.ignored_senders.join(","),
            env_keys: &[],
        },
        Field {
            key: "game.leaderboard_limit",
            value: config.game.leaderboard_limit.to_string(),
            env_keys: &["TALLY_LEADERBOARD_LIMIT"],
        },
        Field {
            key: "announcer.enabled",
            value: config.announcer.enabled.to_string(),
            env_keys: &["TALLY_ANNOUNCER_ENABLED"],
        },
        Field {
            key: "announcer.interval_secs",
            value: config.announcer.interval_secs.to_string(),
            env_keys: &["TALLY_ANNOUNCER_INTERVAL_SECS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["TALLY_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["TALLY_SERVER_PORT", "PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["TALLY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["TALLY_LOGGING_LEVEL", "TALLY_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["TALLY_LOGGING_FORMAT", "TALLY_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tally.toml"), PathBuf::from("config/tally.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
