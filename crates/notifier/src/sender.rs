use std::sync::Arc;

use lookout_common::error::DeliveryError;
use lookout_common::time::Sleeper;
use lookout_common::types::{MessageContent, MessageRef, ThreadAnchor};

use crate::retry::{RetryPolicy, with_retry};
use crate::transport::ChatTransport;

/// Wraps a [`ChatTransport`] so every call is retried with backoff.
///
/// Failures that outlive the retry budget are returned unchanged; whether to
/// swallow them is the caller's decision.
#[derive(Clone)]
pub struct ResilientSender {
    transport: Arc<dyn ChatTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl ResilientSender {
    pub fn new(transport: Arc<dyn ChatTransport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            sleeper,
            policy: RetryPolicy::default(),
        }
    }

    /// Post a new message, nested under `anchor` when given.
    pub async fn send_new(
        &self,
        channel: &str,
        content: &MessageContent,
        anchor: Option<&ThreadAnchor>,
    ) -> Result<MessageRef, DeliveryError> {
        let sent = with_retry(&self.policy, self.sleeper.as_ref(), "post_message", || {
            self.transport.post_message(channel, content, anchor)
        })
        .await?;

        tracing::debug!(
            transport = self.transport.name(),
            channel = %sent.channel,
            ts = %sent.ts,
            threaded = anchor.is_some(),
            "Message posted"
        );
        Ok(sent)
    }

    /// Replace the content of an existing message.
    pub async fn send_update(
        &self,
        channel: &str,
        ts: &str,
        content: &MessageContent,
    ) -> Result<MessageRef, DeliveryError> {
        let sent = with_retry(&self.policy, self.sleeper.as_ref(), "update_message", || {
            self.transport.update_message(channel, ts, content)
        })
        .await?;

        tracing::debug!(
            transport = self.transport.name(),
            channel = %sent.channel,
            ts = %sent.ts,
            "Message updated"
        );
        Ok(sent)
    }
}
