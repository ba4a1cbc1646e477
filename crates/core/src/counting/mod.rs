//! Counting engine.
//!
//! Decides whether a channel message continues the shared sequence and, when
//! it does, advances the persisted state and bumps the sender's counters.
//!
//! ```text
//! Submission ─▶ scope filter ─▶ leading number ─▶ consecutive sender? ─▶ next number?
//!                   │                  │                  │                  │
//!                Ignored            Ignored      RejectedConsecutive  RejectedOutOfOrder
//!                                                                            │
//!                                       CAS last_valid_number ◀──────────────┘
//!                                          │ lost: re-evaluate
//!                                          ▼ won
//!                               scalar writes + counter increments ─▶ Accepted
//! ```
//!
//! Within one process every evaluation holds the engine's advance lock from the
//! `last_sender_id` read until that key has been rewritten, so the sender rule
//! and the number rule are judged against the same state. The CAS still guards
//! the number against writers in other processes.

use std::sync::Arc;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::event::EventCalendar;
use crate::domain::keys::{self, LAST_SENDER_ID, LAST_VALID_NUMBER, LAST_VALID_TS};
use crate::domain::member::{ChannelId, UserId};
use crate::domain::submission::{leading_number, IgnoreReason, Submission, SubmissionOutcome};
use crate::errors::CountingError;
use crate::store::SharedCounterStore;

pub const DEFAULT_SYSTEM_SENDER: &str = "USLACKBOT";
const MAX_ADVANCE_ATTEMPTS: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountingRules {
    pub channel_id: ChannelId,
    pub ignored_senders: Vec<UserId>,
}

impl CountingRules {
    pub fn for_channel(channel_id: ChannelId) -> Self {
        Self { channel_id, ignored_senders: vec![UserId(DEFAULT_SYSTEM_SENDER.to_owned())] }
    }
}

/// Snapshot of the persisted singleton state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingState {
    pub last_valid_number: i64,
    pub last_sender: Option<UserId>,
    pub last_valid_ts: Option<String>,
}

enum Attempt {
    Decided(SubmissionOutcome),
    Conflict,
}

pub struct CountingEngine {
    store: SharedCounterStore,
    calendar: Arc<EventCalendar>,
    clock: Arc<dyn Clock>,
    rules: CountingRules,
    advance_lock: Mutex<()>,
}

impl CountingEngine {
    pub fn new(
        store: SharedCounterStore,
        calendar: Arc<EventCalendar>,
        clock: Arc<dyn Clock>,
        rules: CountingRules,
    ) -> Self {
        Self { store, calendar, clock, rules, advance_lock: Mutex::new(()) }
    }

    pub async fn submit(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionOutcome, CountingError> {
        if let Some(reason) = self.out_of_scope(submission) {
            debug!(
                event_name = "counting.submission.ignored",
                reason = reason.label(),
                channel_id = %submission.channel_id,
                "submission outside counting scope"
            );
            return Ok(SubmissionOutcome::Ignored(reason));
        }

        let Some(number) = leading_number(&submission.text) else {
            return Ok(SubmissionOutcome::Ignored(IgnoreReason::NoLeadingNumber));
        };
        debug!(event_name = "counting.submission.number", number, "extracted number");

        let _advancing = self.advance_lock.lock().await;
        for attempt in 1..=MAX_ADVANCE_ATTEMPTS {
            match self.try_advance(submission, number).await? {
                Attempt::Decided(outcome) => {
                    log_outcome(submission, &outcome);
                    return Ok(outcome);
                }
                Attempt::Conflict => {
                    debug!(
                        event_name = "counting.state.conflict",
                        attempt,
                        number,
                        sender_id = %submission.sender_id,
                        "counting state moved underneath submission; re-evaluating"
                    );
                }
            }
        }

        Err(CountingError::Contention { attempts: MAX_ADVANCE_ATTEMPTS })
    }

    pub async fn state(&self) -> Result<CountingState, CountingError> {
        let last_valid_number = match self.store.get(LAST_VALID_NUMBER).await? {
            Some(raw) => parse_state_number(&raw)?,
            None => 0,
        };
        let last_sender = self.store.get(LAST_SENDER_ID).await?.map(UserId);
        let last_valid_ts = self.store.get(LAST_VALID_TS).await?;
        Ok(CountingState { last_valid_number, last_sender, last_valid_ts })
    }

    fn out_of_scope(&self, submission: &Submission) -> Option<IgnoreReason> {
        if submission.channel_id != self.rules.channel_id {
            return Some(IgnoreReason::OtherChannel);
        }
        if submission.sender_id.as_str().is_empty()
            || self.rules.ignored_senders.contains(&submission.sender_id)
        {
            return Some(IgnoreReason::SystemSender);
        }
        if submission.is_threaded() {
            return Some(IgnoreReason::ThreadedReply);
        }
        None
    }

    async fn try_advance(
        &self,
        submission: &Submission,
        number: i64,
    ) -> Result<Attempt, CountingError> {
        let last_sender = self.store.get(LAST_SENDER_ID).await?;
        if last_sender.as_deref() == Some(submission.sender_id.as_str()) {
            return Ok(Attempt::Decided(SubmissionOutcome::RejectedConsecutive));
        }

        let prior = self.store.get(LAST_VALID_NUMBER).await?;
        let last_valid = match prior.as_deref() {
            Some(raw) => parse_state_number(raw)?,
            None => 0,
        };
        let expected = last_valid.checked_add(1).ok_or_else(|| CountingError::CorruptState {
            key: LAST_VALID_NUMBER.to_owned(),
            value: last_valid.to_string(),
        })?;
        if number != expected {
            return Ok(Attempt::Decided(SubmissionOutcome::RejectedOutOfOrder { expected }));
        }

        let won = self
            .store
            .compare_and_swap(LAST_VALID_NUMBER, prior.as_deref(), &number.to_string())
            .await?;
        if !won {
            return Ok(Attempt::Conflict);
        }

        let events = self.record_acceptance(submission).await;
        Ok(Attempt::Decided(SubmissionOutcome::Accepted { number, events }))
    }

    /// Best-effort writes after the number itself has been claimed. Failures
    /// are logged and leave the already-applied writes in place.
    async fn record_acceptance(&self, submission: &Submission) -> Vec<String> {
        let sender = &submission.sender_id;
        let mut failed = Vec::new();

        if let Err(error) = self.store.set(LAST_SENDER_ID, sender.as_str()).await {
            failed.push((LAST_SENDER_ID.to_owned(), error));
        }
        if let Err(error) = self.store.set(LAST_VALID_TS, &submission.timestamp).await {
            failed.push((LAST_VALID_TS.to_owned(), error));
        }

        let now = self.clock.now();
        let monthly = keys::monthly_key(now.year(), now.month(), sender);
        if let Err(error) = self.store.increment(&monthly).await {
            failed.push((monthly, error));
        }

        let mut events = Vec::new();
        for event in self.calendar.running_at(now) {
            let key = keys::event_key(&event.name, sender);
            match self.store.increment(&key).await {
                Ok(_) => events.push(event.name.clone()),
                Err(error) => failed.push((key, error)),
            }
        }

        for (key, error) in &failed {
            warn!(
                event_name = "store.write.partial_failure",
                key = %key,
                sender_id = %sender,
                error = %error,
                "accepted submission could not be fully recorded"
            );
        }

        events
    }
}

fn parse_state_number(raw: &str) -> Result<i64, CountingError> {
    raw.trim().parse::<i64>().map_err(|_| CountingError::CorruptState {
        key: LAST_VALID_NUMBER.to_owned(),
        value: raw.to_owned(),
    })
}

fn log_outcome(submission: &Submission, outcome: &SubmissionOutcome) {
    match outcome {
        SubmissionOutcome::Accepted { number, events } => info!(
            event_name = "counting.submission.accepted",
            number,
            sender_id = %submission.sender_id,
            running_events = events.len(),
            "accepted count"
        ),
        SubmissionOutcome::RejectedOutOfOrder { expected } => info!(
            event_name = "counting.submission.rejected",
            outcome = outcome.label(),
            expected,
            sender_id = %submission.sender_id,
            "rejected count"
        ),
        SubmissionOutcome::RejectedConsecutive => info!(
            event_name = "counting.submission.rejected",
            outcome = outcome.label(),
            sender_id = %submission.sender_id,
            "rejected count"
        ),
        SubmissionOutcome::Ignored(_) => {}
    }
}
