use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::event::{parse_event_time, EventCalendar, EventDefinition};
use crate::domain::member::{ChannelId, UserId};
use crate::counting::{CountingRules, DEFAULT_SYSTEM_SENDER};
use crate::leaderboard::DEFAULT_TOP_N;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub slack: SlackConfig,
    pub game: GameConfig,
    pub announcer: AnnouncerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub events: EventCalendar,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub channel_id: String,
    pub ignored_senders: Vec<String>,
    pub leaderboard_limit: usize,
}

#[derive(Clone, Debug)]
pub struct AnnouncerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Sqlite,
    Memory,
}

impl StoreBackend {
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            Some(Self::Redis)
        } else if url.starts_with("sqlite:") || url == ":memory:" {
            Some(Self::Sqlite)
        } else if url.starts_with("memory://") {
            Some(Self::Memory)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub server_port: Option<u16>,
    pub announcer_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: "redis://localhost:6379/0".to_string(),
                timeout_ms: 2_000,
                max_connections: 5,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
            },
            game: GameConfig {
                channel_id: String::new(),
                ignored_senders: vec![DEFAULT_SYSTEM_SENDER.to_string()],
                leaderboard_limit: DEFAULT_TOP_N,
            },
            announcer: AnnouncerConfig { enabled: true, interval_secs: 60 },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            events: EventCalendar::default(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut event_patches = Vec::new();
        let mut events_path = None;
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            event_patches.extend(patch.events.iter().cloned());
            events_path = patch.events_path.clone();
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tally.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);

        if let Some(path) = read_env("TALLY_EVENTS_PATH").map(PathBuf::from).or(events_path) {
            event_patches.extend(read_events_file(&path)?);
        }
        config.events = build_calendar(event_patches)?;

        config.validate()?;
        Ok(config)
    }

    /// Counting rules derived from the `[game]` section.
    pub fn counting_rules(&self) -> CountingRules {
        CountingRules {
            channel_id: ChannelId(self.game.channel_id.clone()),
            ignored_senders: self.game.ignored_senders.iter().cloned().map(UserId).collect(),
        }
    }

    pub fn store_backend(&self) -> Option<StoreBackend> {
        StoreBackend::from_url(&self.store.url)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(timeout_ms) = store.timeout_ms {
                self.store.timeout_ms = timeout_ms;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(game) = patch.game {
            if let Some(channel_id) = game.channel_id {
                self.game.channel_id = channel_id;
            }
            if let Some(ignored_senders) = game.ignored_senders {
                self.game.ignored_senders = ignored_senders;
            }
            if let Some(leaderboard_limit) = game.leaderboard_limit {
                self.game.leaderboard_limit = leaderboard_limit;
            }
        }

        if let Some(announcer) = patch.announcer {
            if let Some(enabled) = announcer.enabled {
                self.announcer.enabled = enabled;
            }
            if let Some(interval_secs) = announcer.interval_secs {
                self.announcer.interval_secs = interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TALLY_STORE_URL").or_else(|| read_env("REDIS_URL")) {
            self.store.url = value;
        }
        if let Some(value) = read_env("TALLY_STORE_TIMEOUT_MS") {
            self.store.timeout_ms = parse_u64("TALLY_STORE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("TALLY_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("TALLY_STORE_MAX_CONNECTIONS", &value)?;
        }

        let bot_token = read_env("TALLY_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TALLY_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        let channel_id = read_env("TALLY_CHANNEL_ID").or_else(|| read_env("SLACK_CHANNEL_ID"));
        if let Some(value) = channel_id {
            self.game.channel_id = value;
        }
        if let Some(value) = read_env("TALLY_LEADERBOARD_LIMIT") {
            self.game.leaderboard_limit = parse_usize("TALLY_LEADERBOARD_LIMIT", &value)?;
        }

        if let Some(value) = read_env("TALLY_ANNOUNCER_ENABLED") {
            self.announcer.enabled = parse_bool("TALLY_ANNOUNCER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TALLY_ANNOUNCER_INTERVAL_SECS") {
            self.announcer.interval_secs = parse_u64("TALLY_ANNOUNCER_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("TALLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TALLY_SERVER_PORT") {
            self.server.port = parse_u16("TALLY_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("TALLY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TALLY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("TALLY_LOGGING_LEVEL").or_else(|| read_env("TALLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TALLY_LOGGING_FORMAT").or_else(|| read_env("TALLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(channel_id) = overrides.channel_id {
            self.game.channel_id = channel_id;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.announcer_enabled {
            self.announcer.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_slack(&self.slack)?;
        validate_game(&self.game)?;
        validate_announcer(&self.announcer)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tally.toml"), PathBuf::from("config/tally.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_events_file(path: &Path) -> Result<Vec<EventPatch>, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<EventsFile>(&raw)
        .map(|file| file.events)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn build_calendar(patches: Vec<EventPatch>) -> Result<EventCalendar, ConfigError> {
    let events = patches
        .into_iter()
        .map(|patch| {
            Ok(EventDefinition {
                start: parse_event_time(&patch.start)?,
                end: parse_event_time(&patch.end)?,
                name: patch.name,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    EventCalendar::new(events)
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if StoreBackend::from_url(&store.url).is_none() {
        return Err(ConfigError::Validation(
            "store.url must be a redis (`redis://`), sqlite (`sqlite:`) or `memory://` URL"
                .to_string(),
        ));
    }

    if store.timeout_ms == 0 || store.timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "store.timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps"
                .to_string(),
        ));
    }

    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_game(game: &GameConfig) -> Result<(), ConfigError> {
    if game.channel_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "game.channel_id is required (the channel members count in, e.g. `C0123456789`)"
                .to_string(),
        ));
    }

    if game.leaderboard_limit == 0 || game.leaderboard_limit > 45 {
        return Err(ConfigError::Validation(
            "game.leaderboard_limit must be in range 1..=45".to_string(),
        ));
    }

    Ok(())
}

fn validate_announcer(announcer: &AnnouncerConfig) -> Result<(), ConfigError> {
    if announcer.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "announcer.interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    slack: Option<SlackPatch>,
    game: Option<GamePatch>,
    announcer: Option<AnnouncerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    events_path: Option<PathBuf>,
    #[serde(default)]
    events: Vec<EventPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    timeout_ms: Option<u64>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GamePatch {
    channel_id: Option<String>,
    ignored_senders: Option<Vec<String>>,
    leaderboard_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnouncerPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Clone, Debug, Deserialize)]
struct EventPatch {
    name: String,
    start: String,
    end: String,
}

#[derive(Debug, Default, Deserialize)]
struct EventsFile {
    #[serde(default)]
    events: Vec<EventPatch>,
}
