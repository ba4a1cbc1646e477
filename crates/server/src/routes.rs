use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tally_core::store::SharedCounterStore;
use tally_slack::blocks;
use tally_slack::commands::SlashCommandPayload;
use tally_slack::events::{
    wire::{self, Inbound},
    EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent,
};
use tracing::{info, warn};

use crate::health;

#[derive(Clone)]
pub struct SlackState {
    dispatcher: Arc<EventDispatcher>,
}

/// Form body Slack posts for a slash command. Unknown fields are dropped.
#[derive(Debug, Default, Deserialize)]
pub struct SlashCommandForm {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

impl SlashCommandForm {
    fn into_payload(self) -> SlashCommandPayload {
        SlashCommandPayload {
            request_id: self.trigger_id.clone(),
            command: self.command,
            text: self.text,
            channel_id: self.channel_id,
            user_id: self.user_id,
            trigger_id: self.trigger_id,
        }
    }
}

pub fn router(dispatcher: Arc<EventDispatcher>, store: SharedCounterStore) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/commands", post(slack_commands))
        .with_state(SlackState { dispatcher })
        .merge(health::router(store))
}

fn correlation_id(candidate: &str, fallback: &str) -> String {
    if candidate.trim().is_empty() {
        fallback.to_string()
    } else {
        candidate.to_string()
    }
}

pub async fn slack_events(State(state): State<SlackState>, body: Bytes) -> Response {
    let inbound = match wire::decode(&body) {
        Ok(inbound) => inbound,
        Err(error) => {
            warn!(
                event_name = "slack.events.malformed",
                correlation_id = "events",
                error = %error,
                "rejected events api request"
            );
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    match inbound {
        Inbound::Challenge(challenge) => {
            info!(
                event_name = "slack.events.url_verification",
                correlation_id = "events",
                "answered endpoint verification"
            );
            Json(json!({ "challenge": challenge })).into_response()
        }
        Inbound::Envelope(envelope) => {
            let ctx = EventContext::new(correlation_id(&envelope.envelope_id, "events"));
            let dispatcher = state.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(error) = dispatcher.dispatch(&envelope, &ctx).await {
                    warn!(
                        event_name = "slack.events.dispatch_failed",
                        correlation_id = %ctx.correlation_id,
                        error = %error,
                        "event handler failed"
                    );
                }
            });
            StatusCode::OK.into_response()
        }
        Inbound::Ignored => StatusCode::OK.into_response(),
    }
}

pub async fn slack_commands(
    State(state): State<SlackState>,
    Form(form): Form<SlashCommandForm>,
) -> Response {
    let payload = form.into_payload();
    let ctx = EventContext::new(correlation_id(&payload.request_id, "slash-command"));
    let envelope = SlackEnvelope {
        envelope_id: payload.request_id.clone(),
        event: SlackEvent::SlashCommand(payload),
    };

    match state.dispatcher.dispatch(&envelope, &ctx).await {
        Ok(HandlerResult::Responded(message)) => Json(message.ephemeral_response()).into_response(),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(
                event_name = "slack.commands.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "slash command could not be answered"
            );
            let message = blocks::error_message(&error.to_string(), &ctx.correlation_id);
            Json(message.ephemeral_response()).into_response()
        }
    }
}
