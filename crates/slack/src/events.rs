use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use tally_core::counting::CountingEngine;
use tally_core::domain::member::{ChannelId, UserId};
use tally_core::domain::submission::{Submission, SubmissionOutcome};
use tally_core::errors::CountingError;

use crate::{
    blocks::{self, MessageTemplate, CONSECUTIVE_NOTICE, REJECTION_REACTION},
    commands::{
        parse_counting_query, CommandParseError, CommandRouter, CountingQueryService,
        SlashCommandPayload,
    },
    notify::Notifier,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    SlashCommand,
    Unsupported,
}

/// A channel message as delivered by the Events API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    /// Empty for bot and system messages that carry no user.
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl MessageEvent {
    pub fn to_submission(&self) -> Submission {
        Submission {
            channel_id: ChannelId(self.channel_id.clone()),
            sender_id: UserId(self.user_id.clone()),
            text: self.text.clone(),
            timestamp: self.ts.clone(),
            thread_ts: self.thread_ts.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Counting(#[from] CountingError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired for the counting game: channel messages and the two slash commands.
pub fn counting_dispatcher<S>(
    engine: Arc<CountingEngine>,
    notifier: Arc<dyn Notifier>,
    queries: S,
) -> EventDispatcher
where
    S: CountingQueryService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(engine, notifier));
    dispatcher.register(SlashCommandHandler::new(queries));
    dispatcher
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: CountingQueryService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: CountingQueryService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let query = parse_counting_query(payload)?;
        let message = self.router.route(query, &ctx.correlation_id).await;
        Ok(HandlerResult::Responded(message))
    }
}

/// Feeds channel messages to the counting engine and tells rejected senders why.
pub struct MessageHandler {
    engine: Arc<CountingEngine>,
    notifier: Arc<dyn Notifier>,
}

impl MessageHandler {
    pub fn new(engine: Arc<CountingEngine>, notifier: Arc<dyn Notifier>) -> Self {
        Self { engine, notifier }
    }

    async fn notify_rejection(&self, submission: &Submission, notice: &str, ctx: &EventContext) {
        let channel = &submission.channel_id;
        if let Err(error) =
            self.notifier.add_reaction(channel, &submission.timestamp, REJECTION_REACTION).await
        {
            warn!(
                event_name = "notify.rejection.reaction_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not flag rejected submission"
            );
        }
        if let Err(error) =
            self.notifier.emit_ephemeral(channel, &submission.sender_id, notice).await
        {
            warn!(
                event_name = "notify.rejection.notice_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not send rejection notice"
            );
        }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let submission = event.to_submission();
        let outcome = self.engine.submit(&submission).await.map_err(|error| {
            error!(
                event_name = "counting.submission.failed",
                correlation_id = %ctx.correlation_id,
                sender_id = %submission.sender_id,
                error = %error,
                "submission aborted"
            );
            EventHandlerError::from(error)
        })?;

        match &outcome {
            SubmissionOutcome::Ignored(_) => return Ok(HandlerResult::Ignored),
            SubmissionOutcome::RejectedConsecutive => {
                self.notify_rejection(&submission, CONSECUTIVE_NOTICE, ctx).await;
            }
            SubmissionOutcome::RejectedOutOfOrder { expected } => {
                let notice = blocks::out_of_order_notice(*expected);
                self.notify_rejection(&submission, &notice, ctx).await;
            }
            SubmissionOutcome::Accepted { .. } => {}
        }

        Ok(HandlerResult::Processed)
    }
}

/// Events API request bodies.
pub mod wire {
    use serde::Deserialize;
    use thiserror::Error;

    use super::{MessageEvent, SlackEnvelope, SlackEvent};

    #[derive(Debug, Error)]
    pub enum WireError {
        #[error("malformed events api payload: {0}")]
        Malformed(#[from] serde_json::Error),
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Inbound {
        /// Endpoint verification handshake; echo the challenge back.
        Challenge(String),
        Envelope(SlackEnvelope),
        Ignored,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Request {
        UrlVerification {
            challenge: String,
        },
        EventCallback {
            #[serde(default)]
            event_id: String,
            event: InnerEvent,
        },
        #[serde(other)]
        Other,
    }

    #[derive(Debug, Deserialize)]
    struct InnerEvent {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        channel: String,
        #[serde(default)]
        user: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        ts: String,
        #[serde(default)]
        thread_ts: Option<String>,
    }

    pub fn decode(body: &[u8]) -> Result<Inbound, WireError> {
        let request: Request = serde_json::from_slice(body)?;
        Ok(match request {
            Request::UrlVerification { challenge } => Inbound::Challenge(challenge),
            Request::EventCallback { event_id, event } => {
                Inbound::Envelope(SlackEnvelope { envelope_id: event_id, event: event.into() })
            }
            Request::Other => Inbound::Ignored,
        })
    }

    impl From<InnerEvent> for SlackEvent {
        fn from(event: InnerEvent) -> Self {
            if event.kind != "message" {
                return SlackEvent::Unsupported { event_type: event.kind };
            }
            SlackEvent::Message(MessageEvent {
                channel_id: event.channel,
                user_id: event.user,
                text: event.text,
                ts: event.ts,
                thread_ts: event.thread_ts,
            })
        }
    }
}
