//! Persisted key layout shared with existing deployments.
//!
//! ```text
//! leaderboard:{year}-{month}:{user}   monthly count, month is 1..=12 unpadded
//! event:{name}:{user}                 per-event count
//! last_valid_number                   last accepted number
//! last_sender_id                      sender of the last accepted number
//! last_valid_ts                       Slack ts of the last accepted message
//! ```

use crate::domain::member::UserId;

pub const LAST_VALID_NUMBER: &str = "last_valid_number";
pub const LAST_SENDER_ID: &str = "last_sender_id";
pub const LAST_VALID_TS: &str = "last_valid_ts";

const MONTHLY_NAMESPACE: &str = "leaderboard";
const EVENT_NAMESPACE: &str = "event";

pub fn monthly_prefix(year: i32, month: u32) -> String {
    format!("{MONTHLY_NAMESPACE}:{year}-{month}:")
}

pub fn monthly_key(year: i32, month: u32, user: &UserId) -> String {
    format!("{}{}", monthly_prefix(year, month), user.as_str())
}

pub fn event_prefix(event_name: &str) -> String {
    format!("{EVENT_NAMESPACE}:{event_name}:")
}

pub fn event_key(event_name: &str, user: &UserId) -> String {
    format!("{}{}", event_prefix(event_name), user.as_str())
}

/// Recovers the user id from a counter key scanned under `prefix`.
///
/// The remainder after the prefix must be a non-empty run of word characters
/// (`[A-Za-z0-9_]`); anything else belongs to a different scope or is noise.
pub fn user_from_key(prefix: &str, key: &str) -> Option<UserId> {
    let remainder = key.strip_prefix(prefix)?;
    let is_word = |ch: char| ch.is_ascii_alphanumeric() || ch == '_';
    (!remainder.is_empty() && remainder.chars().all(is_word)).then(|| UserId(remainder.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::{event_key, event_prefix, monthly_key, monthly_prefix, user_from_key};
    use crate::domain::member::UserId;

    #[test]
    fn monthly_keys_use_unpadded_month() {
        let user = UserId("U123".to_owned());
        assert_eq!(monthly_key(2026, 3, &user), "leaderboard:2026-3:U123");
        assert_eq!(monthly_prefix(2026, 11), "leaderboard:2026-11:");
    }

    #[test]
    fn event_keys_embed_event_name() {
        let user = UserId("U9".to_owned());
        assert_eq!(event_key("hacktober", &user), "event:hacktober:U9");
    }

    #[test]
    fn user_parse_requires_word_characters() {
        let prefix = monthly_prefix(2026, 1);
        assert_eq!(
            user_from_key(&prefix, "leaderboard:2026-1:U_42"),
            Some(UserId("U_42".to_owned()))
        );
        assert_eq!(user_from_key(&prefix, "leaderboard:2026-1:"), None);
        assert_eq!(user_from_key(&prefix, "leaderboard:2026-1:U1:extra"), None);
        assert_eq!(user_from_key(&prefix, "leaderboard:2026-11:U1"), None);
    }

    #[test]
    fn event_prefix_does_not_claim_nested_event_names() {
        let prefix = event_prefix("spring");
        assert_eq!(user_from_key(&prefix, "event:spring:finale:U1"), None);
        assert_eq!(user_from_key(&prefix, "event:spring:U1"), Some(UserId("U1".to_owned())));
    }
}
