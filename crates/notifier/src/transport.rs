use async_trait::async_trait;

use lookout_common::error::DeliveryError;
use lookout_common::types::{MessageContent, MessageRef, ThreadAnchor};

/// The two primitives a chat platform must offer: post a new message and
/// replace the content of an existing one.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a new message, optionally as a reply under `anchor`.
    async fn post_message(
        &self,
        channel: &str,
        content: &MessageContent,
        anchor: Option<&ThreadAnchor>,
    ) -> Result<MessageRef, DeliveryError>;

    /// Replace the content of message `ts` in `channel`.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &MessageContent,
    ) -> Result<MessageRef, DeliveryError>;

    /// Human-readable name for logs (e.g. "slack").
    fn name(&self) -> &'static str;
}
