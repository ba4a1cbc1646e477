use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Layout used by older `events` files: `15:04 Jan 2, 2006 UTC`.
const LEGACY_EVENT_TIME_FORMAT: &str = "%H:%M %b %d, %Y";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventDefinition {
    /// Closed window: both `start` and `end` count as running.
    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

/// The immutable set of configured counting events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventCalendar {
    events: Vec<EventDefinition>,
}

impl EventCalendar {
    pub fn new(events: Vec<EventDefinition>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for event in &events {
            validate_event_name(&event.name)?;
            if !seen.insert(event.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "event `{}` is defined more than once",
                    event.name
                )));
            }
            if event.start > event.end {
                return Err(ConfigError::Validation(format!(
                    "event `{}` ends before it starts",
                    event.name
                )));
            }
        }

        Ok(Self { events })
    }

    pub fn running_at(&self, now: DateTime<Utc>) -> Vec<&EventDefinition> {
        self.events.iter().filter(|event| event.is_running_at(now)).collect()
    }

    pub fn find(&self, name: &str) -> Option<&EventDefinition> {
        self.events.iter().find(|event| event.name == name)
    }

    pub fn events(&self) -> &[EventDefinition] {
        &self.events
    }
}

fn validate_event_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation("event name must not be empty".to_string()));
    }
    // `:` would alias another event's key space; glob metacharacters break prefix scans.
    if let Some(bad) = name.chars().find(|ch| matches!(ch, ':' | '*' | '?' | '[' | ']' | '\\')) {
        return Err(ConfigError::Validation(format!(
            "event name `{name}` contains reserved character `{bad}`"
        )));
    }
    Ok(())
}

/// Parses an event boundary in RFC 3339 or the legacy `HH:MM Mon D, YYYY UTC` layout.
pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let invalid = || {
        ConfigError::Validation(format!(
            "event time `{raw}` must be RFC 3339 or `HH:MM Mon D, YYYY UTC`"
        ))
    };
    let (local, zone) = trimmed.rsplit_once(' ').ok_or_else(invalid)?;
    if !matches!(zone, "UTC" | "GMT" | "Z") {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(local, LEGACY_EVENT_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid())
}
