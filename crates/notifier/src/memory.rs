//! In-memory chat transport.
//!
//! Records every delivered message instead of calling a chat platform. Used
//! for dry runs and by tests, which can also script failures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use lookout_common::error::DeliveryError;
use lookout_common::types::{MessageContent, MessageRef, ThreadAnchor};

use crate::transport::ChatTransport;

/// A message accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Posted {
        reference: MessageRef,
        content: MessageContent,
        anchor: Option<ThreadAnchor>,
    },
    Updated {
        reference: MessageRef,
        content: MessageContent,
    },
}

impl SentMessage {
    pub fn reference(&self) -> &MessageRef {
        match self {
            SentMessage::Posted { reference, .. } | SentMessage::Updated { reference, .. } => {
                reference
            }
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            SentMessage::Posted { content, .. } | SentMessage::Updated { content, .. } => content,
        }
    }

    pub fn is_post(&self) -> bool {
        matches!(self, SentMessage::Posted { .. })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sent: Vec<SentMessage>,
    failures: VecDeque<DeliveryError>,
    /// Updates to these message ids always fail.
    broken: HashMap<String, DeliveryError>,
    attempts: usize,
    next_id: u64,
}

/// Cloneable handle; clones share the same message log.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    log_messages: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that also logs each message at info level.
    pub fn dry_run() -> Self {
        Self {
            state: Arc::default(),
            log_messages: true,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call fail with `error`. Calls queue up in order.
    pub fn fail_next(&self, error: DeliveryError) {
        self.state().failures.push_back(error);
    }

    /// Make every update of message `ts` fail with `error`.
    pub fn fail_updates_to(&self, ts: &str, error: DeliveryError) {
        self.state().broken.insert(ts.to_string(), error);
    }

    /// Every accepted message, in delivery order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Number of calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }

    /// Forget recorded messages and attempts.
    pub fn clear(&self) {
        let mut state = self.state();
        state.sent.clear();
        state.attempts = 0;
    }

    fn begin_call(&self) -> Result<(), DeliveryError> {
        let mut state = self.state();
        state.attempts += 1;
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn post_message(
        &self,
        channel: &str,
        content: &MessageContent,
        anchor: Option<&ThreadAnchor>,
    ) -> Result<MessageRef, DeliveryError> {
        self.begin_call()?;

        let mut state = self.state();
        state.next_id += 1;
        let reference = MessageRef::new(format!("{}.{:06}", 1_700_000_000, state.next_id), channel);

        if self.log_messages {
            tracing::info!(
                channel,
                ts = %reference.ts,
                thread_ts = anchor.map(|a| a.thread_ts.as_str()),
                header = %content.header,
                "Dry-run post"
            );
        }

        state.sent.push(SentMessage::Posted {
            reference: reference.clone(),
            content: content.clone(),
            anchor: anchor.cloned(),
        });
        Ok(reference)
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &MessageContent,
    ) -> Result<MessageRef, DeliveryError> {
        self.begin_call()?;
        if let Some(error) = self.state().broken.get(ts).cloned() {
            return Err(error);
        }

        let reference = MessageRef::new(ts, channel);
        if self.log_messages {
            tracing::info!(channel, ts, header = %content.header, "Dry-run update");
        }

        self.state().sent.push(SentMessage::Updated {
            reference: reference.clone(),
            content: content.clone(),
        });
        Ok(reference)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
