//! Ranked standings per scope, computed from the counter key space on every call.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::keys;
use crate::domain::member::UserId;
use crate::errors::LeaderboardError;
use crate::store::SharedCounterStore;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Monthly { year: i32, month: u32 },
    Event(String),
}

impl Scope {
    pub fn current_month(now: DateTime<Utc>) -> Self {
        Self::Monthly { year: now.year(), month: now.month() }
    }

    pub fn prefix(&self) -> String {
        match self {
            Self::Monthly { year, month } => keys::monthly_prefix(*year, *month),
            Self::Event(name) => keys::event_prefix(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monthly { year, month } => write!(f, "{year}-{month:02}"),
            Self::Event(name) => write!(f, "event `{name}`"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user: UserId,
    pub count: i64,
}

/// Higher counts first; equal counts fall back to ascending user id.
fn standing_order(left: &LeaderboardEntry, right: &LeaderboardEntry) -> Ordering {
    right.count.cmp(&left.count).then_with(|| left.user.cmp(&right.user))
}

#[derive(Clone)]
pub struct LeaderboardAggregator {
    store: SharedCounterStore,
}

impl LeaderboardAggregator {
    pub fn new(store: SharedCounterStore) -> Self {
        Self { store }
    }

    pub async fn rank(&self, scope: &Scope) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let prefix = scope.prefix();
        let scanned = self.store.scan_prefix(&prefix).await?;

        let mut entries = Vec::with_capacity(scanned.len());
        for (key, value) in scanned {
            let Some(user) = keys::user_from_key(&prefix, &key) else {
                continue;
            };
            let count = value
                .trim()
                .parse::<i64>()
                .map_err(|_| LeaderboardError::CorruptData { key, value })?;
            entries.push(LeaderboardEntry { user, count });
        }

        entries.sort_by(standing_order);
        Ok(entries)
    }

    /// Full ranking truncated to the first `limit` entries.
    pub async fn top(
        &self,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let mut entries = self.rank(scope).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn leader(
        &self,
        scope: &Scope,
    ) -> Result<Option<LeaderboardEntry>, LeaderboardError> {
        Ok(self.rank(scope).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{LeaderboardAggregator, LeaderboardEntry, Scope};
    use crate::domain::member::UserId;
    use crate::errors::{LeaderboardError, StoreError};
    use crate::store::InMemoryCounterStore;

    fn entry(user: &str, count: i64) -> LeaderboardEntry {
        LeaderboardEntry { user: UserId(user.to_owned()), count }
    }

    fn october() -> Scope {
        Scope::Monthly { year: 2026, month: 10 }
    }

    #[tokio::test]
    async fn ties_break_by_ascending_user_id() {
        let store = InMemoryCounterStore::with_entries([
            ("leaderboard:2026-10:UA", "5"),
            ("leaderboard:2026-10:UC", "7"),
            ("leaderboard:2026-10:UB", "7"),
        ]);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let ranked = aggregator.rank(&october()).await.expect("rank");

        assert_eq!(ranked, vec![entry("UB", 7), entry("UC", 7), entry("UA", 5)]);
    }

    #[tokio::test]
    async fn monthly_scope_only_reads_its_own_prefix() {
        let store = InMemoryCounterStore::with_entries([
            ("leaderboard:2026-1:UA", "50"),
            ("leaderboard:2026-10:UA", "2"),
            ("leaderboard:2025-10:UA", "80"),
            ("event:fall:UA", "9"),
            ("last_valid_number", "100"),
        ]);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let january =
            aggregator.rank(&Scope::Monthly { year: 2026, month: 1 }).await.expect("rank");
        let october = aggregator.rank(&october()).await.expect("rank");

        assert_eq!(january, vec![entry("UA", 50)]);
        assert_eq!(october, vec![entry("UA", 2)]);
    }

    #[tokio::test]
    async fn event_scope_ranks_event_counters() {
        let store = InMemoryCounterStore::with_entries([
            ("event:fall:UA", "3"),
            ("event:fall:UB", "11"),
            ("event:spring:UC", "40"),
        ]);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let ranked = aggregator.rank(&Scope::Event("fall".to_owned())).await.expect("rank");

        assert_eq!(ranked, vec![entry("UB", 11), entry("UA", 3)]);
    }

    #[tokio::test]
    async fn malformed_keys_are_skipped() {
        let store = InMemoryCounterStore::with_entries([
            ("leaderboard:2026-10:UA", "1"),
            ("leaderboard:2026-10:", "4"),
            ("leaderboard:2026-10:U-B", "not-even-read"),
        ]);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let ranked = aggregator.rank(&october()).await.expect("rank");

        assert_eq!(ranked, vec![entry("UA", 1)]);
    }

    #[tokio::test]
    async fn non_integer_value_fails_the_whole_ranking() {
        let store = InMemoryCounterStore::with_entries([
            ("leaderboard:2026-10:UA", "1"),
            ("leaderboard:2026-10:UB", "lots"),
        ]);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let error = aggregator.rank(&october()).await.expect_err("corrupt value");

        assert_eq!(
            error,
            LeaderboardError::CorruptData {
                key: "leaderboard:2026-10:UB".to_owned(),
                value: "lots".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn top_truncates_after_full_ranking() {
        let store = InMemoryCounterStore::with_entries(
            (1..=15).map(|n| (format!("leaderboard:2026-10:U{n:02}"), n.to_string())),
        );
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let top = aggregator.top(&october(), 10).await.expect("top");

        assert_eq!(top.len(), 10);
        assert_eq!(top.first(), Some(&entry("U15", 15)));
        assert_eq!(top.last(), Some(&entry("U06", 6)));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_store_error() {
        let store = InMemoryCounterStore::new();
        store.set_unavailable(true);
        let aggregator = LeaderboardAggregator::new(Arc::new(store));

        let error = aggregator.leader(&october()).await.expect_err("store down");

        assert!(matches!(error, LeaderboardError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn current_month_scope_uses_utc_calendar() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).single().expect("timestamp");
        let scope = Scope::current_month(now);

        assert_eq!(scope, Scope::Monthly { year: 2026, month: 3 });
        assert_eq!(scope.prefix(), "leaderboard:2026-3:");
    }
}
