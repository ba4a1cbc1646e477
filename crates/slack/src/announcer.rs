//! Periodic "current leader" announcement in the counting channel.
//!
//! Every tick ranks the current month and posts the top counter. A tick that
//! fails is logged and dropped; the next tick starts from scratch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use tally_core::clock::Clock;
use tally_core::domain::member::ChannelId;
use tally_core::leaderboard::{LeaderboardAggregator, LeaderboardEntry, Scope};

use crate::blocks;
use crate::notify::Notifier;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnounceOutcome {
    Announced { scope: Scope, leader: LeaderboardEntry },
    EmptyBoard { scope: Scope },
    RankFailed { scope: Scope, error: String },
    NotifyFailed { scope: Scope, error: String },
}

pub struct ScheduledAnnouncer {
    aggregator: LeaderboardAggregator,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    channel: ChannelId,
    interval: Duration,
}

impl ScheduledAnnouncer {
    pub fn new(
        aggregator: LeaderboardAggregator,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        channel: ChannelId,
        interval: Duration,
    ) -> Self {
        let interval = interval.max(Duration::from_secs(1));
        Self { aggregator, notifier, clock, channel, interval }
    }

    /// Runs a single announcement. Never fails; the outcome says what happened.
    pub async fn fire_once(&self) -> AnnounceOutcome {
        let scope = Scope::current_month(self.clock.now());

        let leader = match self.aggregator.leader(&scope).await {
            Ok(Some(leader)) => leader,
            Ok(None) => {
                info!(
                    event_name = "announcer.tick.skipped",
                    scope = %scope,
                    "nobody has counted this month yet"
                );
                return AnnounceOutcome::EmptyBoard { scope };
            }
            Err(error) => {
                warn!(
                    event_name = "announcer.tick.rank_failed",
                    scope = %scope,
                    error = %error,
                    "could not rank leaderboard for announcement"
                );
                return AnnounceOutcome::RankFailed { scope, error: error.to_string() };
            }
        };

        let text = blocks::leader_announcement(&scope, &leader);
        if let Err(error) = self.notifier.emit(&self.channel, &text).await {
            warn!(
                event_name = "announcer.tick.notify_failed",
                scope = %scope,
                error = %error,
                "could not post announcement"
            );
            return AnnounceOutcome::NotifyFailed { scope, error: error.to_string() };
        }

        info!(
            event_name = "announcer.tick.announced",
            scope = %scope,
            leader = %leader.user,
            count = leader.count,
            "announced counting leader"
        );
        AnnounceOutcome::Announced { scope, leader }
    }

    /// Starts the announcement loop on its own task, first firing on the next
    /// wall-clock multiple of the interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let delay = delay_until_boundary(self.clock.now(), self.interval);
            let mut ticker = time::interval_at(Instant::now() + delay, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                event_name = "announcer.started",
                interval_secs = self.interval.as_secs(),
                first_tick_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "leader announcer running"
            );

            loop {
                ticker.tick().await;
                self.fire_once().await;
            }
        })
    }
}

/// Time left until `now` reaches the next multiple of `interval` since the epoch.
pub fn delay_until_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let into_period = now.timestamp_millis().rem_euclid(interval_ms);
    if into_period == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::try_from(interval_ms - into_period).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use tally_core::clock::FixedClock;
    use tally_core::domain::member::{ChannelId, UserId};
    use tally_core::leaderboard::{LeaderboardAggregator, LeaderboardEntry, Scope};
    use tally_core::store::InMemoryCounterStore;

    use super::{delay_until_boundary, AnnounceOutcome, ScheduledAnnouncer};
    use crate::notify::{Notification, RecordingNotifier};

    fn announcer(
        store: Arc<InMemoryCounterStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> ScheduledAnnouncer {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).single().expect("now");
        ScheduledAnnouncer::new(
            LeaderboardAggregator::new(store),
            notifier,
            Arc::new(FixedClock::new(now)),
            ChannelId("CCOUNT".to_owned()),
            Duration::from_secs(1),
        )
    }

    fn october() -> Scope {
        Scope::Monthly { year: 2026, month: 10 }
    }

    #[tokio::test]
    async fn announces_current_month_leader() {
        let store = Arc::new(InMemoryCounterStore::with_entries([
            ("leaderboard:2026-10:U1", "4"),
            ("leaderboard:2026-10:U2", "11"),
            ("leaderboard:2026-9:U3", "40"),
        ]));
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = announcer(store, notifier.clone()).fire_once().await;

        assert_eq!(
            outcome,
            AnnounceOutcome::Announced {
                scope: october(),
                leader: LeaderboardEntry { user: UserId("U2".to_owned()), count: 11 },
            }
        );
        assert_eq!(
            notifier.sent(),
            vec![Notification::Message {
                channel: "CCOUNT".to_owned(),
                text: "Counting leader for *October 2026*: <@U2> with *11*".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn empty_board_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome =
            announcer(Arc::new(InMemoryCounterStore::new()), notifier.clone()).fire_once().await;

        assert_eq!(outcome, AnnounceOutcome::EmptyBoard { scope: october() });
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn store_outage_is_reported_not_raised() {
        let store = Arc::new(InMemoryCounterStore::new());
        store.set_unavailable(true);
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = announcer(store, notifier.clone()).fire_once().await;

        assert!(matches!(outcome, AnnounceOutcome::RankFailed { .. }));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_is_reported_not_raised() {
        let store = Arc::new(InMemoryCounterStore::with_entries([("leaderboard:2026-10:U1", "1")]));

        let outcome = announcer(store, Arc::new(RecordingNotifier::failing())).fire_once().await;

        assert!(matches!(outcome, AnnounceOutcome::NotifyFailed { .. }));
    }

    #[tokio::test]
    async fn spawned_loop_keeps_announcing() {
        let store = Arc::new(InMemoryCounterStore::with_entries([("leaderboard:2026-10:U1", "1")]));
        let notifier = Arc::new(RecordingNotifier::new());

        let handle = announcer(store, notifier.clone()).spawn();
        let mut waited = Duration::ZERO;
        while notifier.sent().is_empty() && waited < Duration::from_secs(3) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        handle.abort();

        assert!(!notifier.sent().is_empty(), "first tick should fire on the aligned boundary");
    }

    #[test]
    fn delay_aligns_to_next_minute() {
        let interval = Duration::from_secs(60);
        let mid_minute = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 42).single().expect("time");
        let on_minute = Utc.with_ymd_and_hms(2026, 10, 15, 12, 1, 0).single().expect("time");

        assert_eq!(delay_until_boundary(mid_minute, interval), Duration::from_secs(18));
        assert_eq!(delay_until_boundary(on_minute, interval), Duration::ZERO);
    }
}
