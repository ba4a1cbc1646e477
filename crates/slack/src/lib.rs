//! Slack integration for the counting game
//!
//! - **Events** (`events`) - Events API decoding, dispatcher, channel message handler
//! - **Slash Commands** (`commands`) - `/leaderboard` and `/events`
//! - **Block Kit** (`blocks`) - leaderboard and notice rendering
//! - **Notifier** (`notify`) - outbound Web API calls
//! - **Announcer** (`announcer`) - periodic leader announcement
//!
//! # Architecture
//!
//! ```text
//! Events API / slash command → EventDispatcher → MessageHandler → CountingEngine
//!                                    │                 └→ Notifier (reaction, ephemeral notice)
//!                                    └→ SlashCommandHandler → LeaderboardAggregator
//!                                                                 ↓
//!                                                     Block Kit response ← MessageTemplate
//! ```

pub mod announcer;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod notify;
