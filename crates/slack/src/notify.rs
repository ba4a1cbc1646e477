use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use tally_core::domain::member::{ChannelId, UserId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("slack http client could not be built: {0}")]
    Client(String),
    #[error("slack `{method}` request failed: {message}")]
    Transport { method: &'static str, message: String },
    #[error("slack `{method}` returned http status {status}")]
    Status { method: &'static str, status: u16 },
    #[error("slack `{method}` rejected the call: {error}")]
    Api { method: &'static str, error: String },
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts a message everyone in `channel` can see.
    async fn emit(&self, channel: &ChannelId, text: &str) -> Result<(), NotifyError>;

    /// Posts a message in `channel` that only `user` can see.
    async fn emit_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        text: &str,
    ) -> Result<(), NotifyError>;

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message_ts: &str,
        reaction: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client authenticated with a bot token.
pub struct SlackWebClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotifyError::Client(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base_url, bot_token })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call(&self, method: &'static str, body: Value) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| NotifyError::Transport { method, message: error.to_string() })?;

        if !response.status().is_success() {
            return Err(NotifyError::Status { method, status: response.status().as_u16() });
        }

        let payload: SlackApiResponse = response
            .json()
            .await
            .map_err(|error| NotifyError::Transport { method, message: error.to_string() })?;
        if !payload.ok {
            return Err(NotifyError::Api {
                method,
                error: payload.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }

        debug!(method, "slack api call succeeded");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackWebClient {
    async fn emit(&self, channel: &ChannelId, text: &str) -> Result<(), NotifyError> {
        self.call("chat.postMessage", json!({ "channel": channel.as_str(), "text": text })).await
    }

    async fn emit_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        text: &str,
    ) -> Result<(), NotifyError> {
        self.call(
            "chat.postEphemeral",
            json!({ "channel": channel.as_str(), "user": user.as_str(), "text": text }),
        )
        .await
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message_ts: &str,
        reaction: &str,
    ) -> Result<(), NotifyError> {
        let result = self
            .call(
                "reactions.add",
                json!({ "channel": channel.as_str(), "timestamp": message_ts, "name": reaction }),
            )
            .await;

        match result {
            Err(NotifyError::Api { error, .. }) if error == "already_reacted" => Ok(()),
            other => other,
        }
    }
}

/// Logs outbound messages instead of sending them.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn emit(&self, channel: &ChannelId, text: &str) -> Result<(), NotifyError> {
        info!(event_name = "notify.noop.emit", channel = %channel, text, "message not sent");
        Ok(())
    }

    async fn emit_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        text: &str,
    ) -> Result<(), NotifyError> {
        info!(
            event_name = "notify.noop.emit_ephemeral",
            channel = %channel,
            user = %user,
            text,
            "ephemeral message not sent"
        );
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message_ts: &str,
        reaction: &str,
    ) -> Result<(), NotifyError> {
        info!(
            event_name = "notify.noop.add_reaction",
            channel = %channel,
            message_ts,
            reaction,
            "reaction not added"
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::{Notification, RecordingNotifier};

/// In-memory notifier for tests in this and downstream crates.
#[cfg(any(test, feature = "test-support"))]
mod recording {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tracing::warn;

    use tally_core::domain::member::{ChannelId, UserId};

    use super::{Notifier, NotifyError};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Notification {
        Message { channel: String, text: String },
        Ephemeral { channel: String, user: String, text: String },
        Reaction { channel: String, message_ts: String, reaction: String },
    }

    /// Keeps every outbound call in memory; optionally fails them all.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        failing: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self { sent: Mutex::new(Vec::new()), failing: true }
        }

        pub fn sent(&self) -> Vec<Notification> {
            match self.sent.lock() {
                Ok(sent) => sent.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }

        fn record(
            &self,
            method: &'static str,
            notification: Notification,
        ) -> Result<(), NotifyError> {
            if self.failing {
                warn!(method, "recording notifier configured to fail");
                return Err(NotifyError::Transport {
                    method,
                    message: "recording failure".to_owned(),
                });
            }
            match self.sent.lock() {
                Ok(mut sent) => sent.push(notification),
                Err(poisoned) => poisoned.into_inner().push(notification),
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn emit(&self, channel: &ChannelId, text: &str) -> Result<(), NotifyError> {
            self.record(
                "chat.postMessage",
                Notification::Message { channel: channel.to_string(), text: text.to_owned() },
            )
        }

        async fn emit_ephemeral(
            &self,
            channel: &ChannelId,
            user: &UserId,
            text: &str,
        ) -> Result<(), NotifyError> {
            self.record(
                "chat.postEphemeral",
                Notification::Ephemeral {
                    channel: channel.to_string(),
                    user: user.to_string(),
                    text: text.to_owned(),
                },
            )
        }

        async fn add_reaction(
            &self,
            channel: &ChannelId,
            message_ts: &str,
            reaction: &str,
        ) -> Result<(), NotifyError> {
            self.record(
                "reactions.add",
                Notification::Reaction {
                    channel: channel.to_string(),
                    message_ts: message_ts.to_owned(),
                    reaction: reaction.to_owned(),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        http::{header, HeaderMap, StatusCode, Uri},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tally_core::domain::member::{ChannelId, UserId};
    use tokio::net::TcpListener;

    use super::{
        NoopNotifier, Notification, Notifier, NotifyError, RecordingNotifier, SlackWebClient,
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct SeenCall {
        path: String,
        authorization: Option<String>,
        body: Value,
    }

    /// Answers every Web API method with `status` and `reply`, keeping what was posted.
    async fn slack_api(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<SeenCall>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let handler = move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
            let recorded = recorded.clone();
            let reply = reply.clone();
            async move {
                let authorization = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                recorded.lock().expect("seen calls").push(SeenCall {
                    path: uri.path().to_owned(),
                    authorization,
                    body,
                });
                (status, Json(reply))
            }
        };
        let app = Router::new().fallback(handler);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind slack api stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{address}/api/"), seen)
    }

    fn client(base_url: &str) -> SlackWebClient {
        SlackWebClient::new(base_url, "xoxb-test".to_owned().into(), Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn method_urls_ignore_trailing_slash() {
        let client = SlackWebClient::new(
            "https://slack.com/api/",
            "xoxb-test".to_owned().into(),
            Duration::from_secs(5),
        )
        .expect("client");

        assert_eq!(client.method_url("chat.postMessage"), "https://slack.com/api/chat.postMessage");
    }

    #[tokio::test]
    async fn recording_notifier_keeps_call_order() {
        let notifier = RecordingNotifier::new();
        let channel = ChannelId("C1".to_owned());

        notifier.add_reaction(&channel, "1.0001", "bangbang").await.expect("reaction");
        notifier
            .emit_ephemeral(&channel, &UserId("U1".to_owned()), "nope")
            .await
            .expect("ephemeral");

        assert_eq!(
            notifier.sent(),
            vec![
                Notification::Reaction {
                    channel: "C1".to_owned(),
                    message_ts: "1.0001".to_owned(),
                    reaction: "bangbang".to_owned(),
                },
                Notification::Ephemeral {
                    channel: "C1".to_owned(),
                    user: "U1".to_owned(),
                    text: "nope".to_owned(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn failing_notifier_reports_transport_error() {
        let notifier = RecordingNotifier::failing();

        let result = notifier.emit(&ChannelId("C1".to_owned()), "hello").await;

        assert!(matches!(result, Err(NotifyError::Transport { method: "chat.postMessage", .. })));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn noop_notifier_accepts_every_call() {
        let notifier = NoopNotifier;
        let channel = ChannelId("C1".to_owned());

        notifier.emit(&channel, "hello").await.expect("emit");
        let user = UserId("U1".to_owned());
        notifier.emit_ephemeral(&channel, &user, "psst").await.expect("ephemeral");
        notifier.add_reaction(&channel, "1.0001", "bangbang").await.expect("reaction");
    }

    #[tokio::test]
    async fn successful_call_posts_json_with_bearer_token() {
        let (base_url, seen) = slack_api(StatusCode::OK, json!({ "ok": true })).await;

        client(&base_url).emit(&ChannelId("C1".to_owned()), "hello").await.expect("emit");

        let seen = seen.lock().expect("seen calls").clone();
        assert_eq!(
            seen,
            vec![SeenCall {
                path: "/api/chat.postMessage".to_owned(),
                authorization: Some("Bearer xoxb-test".to_owned()),
                body: json!({ "channel": "C1", "text": "hello" }),
            }]
        );
    }

    #[tokio::test]
    async fn ok_false_reply_maps_to_api_error() {
        let (base_url, _) =
            slack_api(StatusCode::OK, json!({ "ok": false, "error": "channel_not_found" })).await;

        let result = client(&base_url).emit(&ChannelId("C404".to_owned()), "hello").await;

        assert_eq!(
            result,
            Err(NotifyError::Api {
                method: "chat.postMessage",
                error: "channel_not_found".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let (base_url, _) =
            slack_api(StatusCode::TOO_MANY_REQUESTS, json!({ "ok": false, "error": "ratelimited" }))
                .await;

        let result = client(&base_url)
            .emit_ephemeral(&ChannelId("C1".to_owned()), &UserId("U1".to_owned()), "psst")
            .await;

        assert_eq!(result, Err(NotifyError::Status { method: "chat.postEphemeral", status: 429 }));
    }

    #[tokio::test]
    async fn already_reacted_is_treated_as_success() {
        let (base_url, seen) =
            slack_api(StatusCode::OK, json!({ "ok": false, "error": "already_reacted" })).await;

        client(&base_url)
            .add_reaction(&ChannelId("C1".to_owned()), "1760529600.000100", "bangbang")
            .await
            .expect("already reacted");

        let seen = seen.lock().expect("seen calls").clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "/api/reactions.add");
        assert_eq!(
            seen[0].body,
            json!({ "channel": "C1", "timestamp": "1760529600.000100", "name": "bangbang" })
        );
    }

    #[tokio::test]
    async fn other_reaction_errors_are_reported() {
        let (base_url, _) =
            slack_api(StatusCode::OK, json!({ "ok": false, "error": "invalid_name" })).await;

        let result = client(&base_url)
            .add_reaction(&ChannelId("C1".to_owned()), "1760529600.000100", "not-an-emoji")
            .await;

        assert_eq!(
            result,
            Err(NotifyError::Api { method: "reactions.add", error: "invalid_name".to_owned() })
        );
    }
}
