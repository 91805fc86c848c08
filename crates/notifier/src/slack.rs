//! Slack Web API transport (`chat.postMessage` / `chat.update`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;

use lookout_common::error::DeliveryError;
use lookout_common::types::{MessageContent, MessageRef, ThreadAnchor};

use crate::transport::ChatTransport;

const SLACK_API_URL: &str = "https://slack.com/api";

/// Envelope shared by Slack Web API responses.
#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

/// Slack bot client authenticated with a bot token.
pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_url: SLACK_API_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn post_payload(
        channel: &str,
        content: &MessageContent,
        anchor: Option<&ThreadAnchor>,
    ) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "channel": channel,
            "blocks": content.blocks(),
            "text": content.header,
            "icon_emoji": ":kubernetes:",
            "unfurl_links": false,
        });
        if let Some(anchor) = anchor {
            payload["thread_ts"] = serde_json::json!(anchor.thread_ts);
            payload["reply_broadcast"] = serde_json::json!(anchor.reply_broadcast);
        }
        payload
    }

    fn update_payload(channel: &str, ts: &str, content: &MessageContent) -> serde_json::Value {
        serde_json::json!({
            "channel": channel,
            "ts": ts,
            "blocks": content.blocks(),
            "text": content.header,
        })
    }

    async fn call(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<MessageRef, DeliveryError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("{method} failed: {e}")))?;

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        if let Some(error) = status_error(method, response.status(), retry_after) {
            return Err(error);
        }

        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Malformed(format!("{method}: {e}")))?;
        into_message_ref(body)
    }
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        content: &MessageContent,
        anchor: Option<&ThreadAnchor>,
    ) -> Result<MessageRef, DeliveryError> {
        let payload = Self::post_payload(channel, content, anchor);
        self.call("chat.postMessage", &payload).await
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &MessageContent,
    ) -> Result<MessageRef, DeliveryError> {
        let payload = Self::update_payload(channel, ts, content);
        self.call("chat.update", &payload).await
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

/// `Retry-After` is whole seconds for Slack. Anything else is no hint.
fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Error for a non-success HTTP status, before the body is read.
fn status_error(
    method: &str,
    status: StatusCode,
    retry_after: Option<&str>,
) -> Option<DeliveryError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(DeliveryError::RateLimited {
            retry_after: parse_retry_after(retry_after),
        });
    }
    (!status.is_success())
        .then(|| DeliveryError::Transport(format!("{method} returned HTTP {status}")))
}

fn into_message_ref(body: SlackResponse) -> Result<MessageRef, DeliveryError> {
    if !body.ok {
        let error = body.error.unwrap_or_else(|| "unknown_error".to_string());
        if error == "ratelimited" {
            return Err(DeliveryError::RateLimited { retry_after: None });
        }
        return Err(DeliveryError::Api(error));
    }

    match (body.ts, body.channel) {
        (Some(ts), Some(channel)) => Ok(MessageRef { ts, channel }),
        _ => Err(DeliveryError::Malformed(
            "response missing ts or channel".to_string(),
        )),
    }
}
