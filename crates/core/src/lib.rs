pub mod clock;
pub mod config;
pub mod counting;
pub mod domain;
pub mod errors;
pub mod leaderboard;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, LoadOptions, StoreBackend};
pub use counting::{CountingEngine, CountingRules, CountingState};
pub use domain::event::{EventCalendar, EventDefinition};
pub use domain::member::{ChannelId, UserId};
pub use domain::submission::{IgnoreReason, Submission, SubmissionOutcome};
pub use errors::{CountingError, InterfaceError, LeaderboardError, StoreError};
pub use leaderboard::{LeaderboardAggregator, LeaderboardEntry, Scope};
pub use store::{CounterStore, InMemoryCounterStore, SharedCounterStore};
