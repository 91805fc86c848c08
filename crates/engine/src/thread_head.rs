//! Thread-head manager, one aggregate message per event category.
//!
//! Each category is either closed or open with a head message and the time
//! it was opened. Item messages are posted as replies under the open head.
//! Heads older than the timeout threshold are closed as timed out and
//! replaced on next use; heads older than the refresh threshold get their
//! new replies re-broadcast to the channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lookout_common::config::ThreadConfig;
use lookout_common::error::Result;
use lookout_common::time::Clock;
use lookout_common::types::{Category, MessageRef, ThreadAnchor};
use lookout_notifier::ResilientSender;

use crate::composer::{HeadStatus, NotificationComposer};
use crate::registry::ProblemRegistry;
use crate::tracking::PerCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenHead {
    pub message: MessageRef,
    pub created_at: DateTime<Utc>,
}

/// Collaborators a head operation delivers through.
pub struct HeadContext<'a> {
    pub sender: &'a ResilientSender,
    pub composer: &'a NotificationComposer,
    pub problems: &'a mut ProblemRegistry,
}

pub struct ThreadHeadManager {
    config: ThreadConfig,
    clock: Arc<dyn Clock>,
    heads: PerCategory<Option<OpenHead>>,
    /// Items opened since each head was (re)created.
    counters: PerCategory<usize>,
}

impl ThreadHeadManager {
    pub fn new(config: ThreadConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            heads: PerCategory::default(),
            counters: PerCategory::default(),
        }
    }

    pub fn head(&self, category: Category) -> Option<&OpenHead> {
        self.heads.get(category).as_ref()
    }

    pub fn is_open(&self, category: Category) -> bool {
        self.heads.get(category).is_some()
    }

    pub fn counter(&self, category: Category) -> usize {
        *self.counters.get(category)
    }

    /// Count one more item opened under the current head.
    pub fn record_item(&mut self, category: Category) {
        *self.counters.get_mut(category) += 1;
    }

    /// Denominator shown on the head. Items carried over from a timed-out
    /// head are not counted by the reset counter, so never show fewer than remain.
    fn shown_total(&self, category: Category, remaining: usize) -> usize {
        self.counter(category).max(remaining)
    }

    fn age(&self, head: &OpenHead) -> std::time::Duration {
        (self.clock.now() - head.created_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Obtain the anchor for a new item message in `category`, closing a
    /// timed-out head and opening a fresh one as needed.
    ///
    /// `remaining` is the current size of the category's active map.
    /// Delivery failures propagate: this runs on the item-send path.
    pub async fn acquire(
        &mut self,
        category: Category,
        remaining: usize,
        ctx: HeadContext<'_>,
    ) -> Result<ThreadAnchor> {
        let channel = self.config.channel(category).to_string();

        if let Some(head) = self.heads.get(category).clone()
            && self.age(&head) > self.config.timeout_threshold
        {
            let content = ctx.composer.thread_head(
                category,
                HeadStatus::TimedOut,
                remaining,
                self.shown_total(category, remaining),
            );
            ctx.sender
                .send_update(&head.message.channel, &head.message.ts, &content)
                .await?;

            tracing::info!(
                category = %category,
                ts = %head.message.ts,
                "Thread head timed out"
            );
            *self.heads.get_mut(category) = None;
            ctx.problems.clear_all();
        }

        let head = match self.heads.get(category).clone() {
            Some(head) => head,
            None => {
                let content =
                    ctx.composer
                        .thread_head(category, HeadStatus::Progressing, remaining, 0);
                let message = ctx.sender.send_new(&channel, &content, None).await?;
                let head = OpenHead {
                    message,
                    created_at: self.clock.now(),
                };

                tracing::info!(
                    category = %category,
                    ts = %head.message.ts,
                    channel = %head.message.channel,
                    "Thread head opened"
                );
                *self.heads.get_mut(category) = Some(head.clone());
                *self.counters.get_mut(category) = 0;
                ctx.problems.clear_all();
                head
            }
        };

        Ok(ThreadAnchor {
            thread_ts: head.message.ts.clone(),
            reply_broadcast: self.age(&head) > self.config.refresh_threshold,
        })
    }

    /// Re-render the head after the active map for `category` changed.
    ///
    /// Closes the head when nothing remains. Delivery failures are logged
    /// and swallowed; the in-memory state is then left unchanged.
    pub async fn refresh(&mut self, category: Category, remaining: usize, ctx: HeadContext<'_>) {
        let Some(head) = self.heads.get(category).clone() else {
            if remaining == 0 {
                *self.counters.get_mut(category) = 0;
            }
            return;
        };
        let total = self.shown_total(category, remaining);

        let status = if remaining == 0 {
            HeadStatus::Complete
        } else if !ctx.problems.is_empty() {
            HeadStatus::Problems
        } else {
            HeadStatus::Progressing
        };
        let content = ctx.composer.thread_head(category, status, remaining, total);

        if let Err(e) = ctx
            .sender
            .send_update(&head.message.channel, &head.message.ts, &content)
            .await
        {
            tracing::warn!(
                category = %category,
                ts = %head.message.ts,
                error = %e,
                "Failed to update thread head"
            );
            return;
        }

        if remaining == 0 {
            tracing::info!(category = %category, total, "Thread head closed");
            *self.heads.get_mut(category) = None;
            *self.counters.get_mut(category) = 0;
        } else {
            tracing::debug!(
                category = %category,
                remaining,
                total,
                problems = ctx.problems.len(),
                ?status,
                "Thread head refreshed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lookout_common::config::DisplayConfig;
    use lookout_common::error::DeliveryError;
    use lookout_common::time::{ManualClock, RecordingSleeper};
    use lookout_common::types::{Icon, WorkloadKey};
    use crate::registry::ProblemSource;
    use lookout_notifier::memory::{MemoryTransport, SentMessage};
    use std::time::Duration;

    struct Fixture {
        transport: MemoryTransport,
        clock: ManualClock,
        sender: ResilientSender,
        composer: NotificationComposer,
        problems: ProblemRegistry,
        heads: ThreadHeadManager,
    }

    impl Fixture {
        fn new() -> Self {
            let transport = MemoryTransport::new();
            let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
            let sender = ResilientSender::new(
                Arc::new(transport.clone()),
                Arc::new(RecordingSleeper::new()),
            );
            Self {
                heads: ThreadHeadManager::new(ThreadConfig::default(), Arc::new(clock.clone())),
                transport,
                clock,
                sender,
                composer: NotificationComposer::new(DisplayConfig::default()),
                problems: ProblemRegistry::new(),
            }
        }

        async fn acquire(&mut self, category: Category, remaining: usize) -> ThreadAnchor {
            let ctx = HeadContext {
                sender: &self.sender,
                composer: &self.composer,
                problems: &mut self.problems,
            };
            self.heads.acquire(category, remaining, ctx).await.unwrap()
        }

        async fn refresh(&mut self, category: Category, remaining: usize) {
            let ctx = HeadContext {
                sender: &self.sender,
                composer: &self.composer,
                problems: &mut self.problems,
            };
            self.heads.refresh(category, remaining, ctx).await;
        }
    }

    #[tokio::test]
    async fn test_acquire_opens_once() {
        let mut f = Fixture::new();
        f.problems.mark(&WorkloadKey::new("ns", "stale"), ProblemSource::Degraded);

        let first = f.acquire(Category::Rollout, 0).await;
        let second = f.acquire(Category::Rollout, 1).await;

        assert_eq!(first.thread_ts, second.thread_ts);
        assert!(!first.reply_broadcast);
        assert!(f.heads.is_open(Category::Rollout));
        assert!(!f.heads.is_open(Category::Degraded));
        assert!(f.problems.is_empty());

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is_post());
        assert_eq!(sent[0].reference().channel, "#robot_dreams");
    }

    #[tokio::test]
    async fn test_reply_broadcast_after_refresh_threshold() {
        let mut f = Fixture::new();
        f.acquire(Category::Rollout, 0).await;

        f.clock.advance(Duration::from_secs(901));
        let anchor = f.acquire(Category::Rollout, 1).await;
        assert!(anchor.reply_broadcast);
        assert_eq!(f.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_closes_and_reopens() {
        let mut f = Fixture::new();
        let old = f.acquire(Category::Degraded, 0).await;
        f.heads.record_item(Category::Degraded);
        f.problems.mark(&WorkloadKey::new("ns", "app"), ProblemSource::Degraded);

        f.clock.advance(Duration::from_secs(3601));
        f.transport.clear();
        let new = f.acquire(Category::Degraded, 1).await;

        assert_ne!(old.thread_ts, new.thread_ts);
        assert!(!new.reply_broadcast);
        assert!(f.problems.is_empty());
        assert_eq!(f.heads.counter(Category::Degraded), 0);

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            SentMessage::Updated { reference, content } => {
                assert_eq!(reference.ts, old.thread_ts);
                assert!(content.header.contains("timed out"));
            }
            other => panic!("expected timed-out update, got {other:?}"),
        }
        assert!(sent[1].is_post());
    }

    #[tokio::test]
    async fn test_refresh_closes_when_empty() {
        let mut f = Fixture::new();
        f.acquire(Category::Rollout, 0).await;
        f.heads.record_item(Category::Rollout);

        f.refresh(Category::Rollout, 1).await;
        assert!(f.heads.is_open(Category::Rollout));
        assert_eq!(f.transport.sent().last().unwrap().content().icon, Icon::Progress);

        f.refresh(Category::Rollout, 0).await;
        assert!(!f.heads.is_open(Category::Rollout));
        assert_eq!(f.heads.counter(Category::Rollout), 0);
        assert_eq!(f.transport.sent().last().unwrap().content().icon, Icon::Healthy);
    }

    #[tokio::test]
    async fn test_refresh_shows_problems() {
        let mut f = Fixture::new();
        f.acquire(Category::Rollout, 0).await;
        f.heads.record_item(Category::Rollout);
        f.problems.mark(&WorkloadKey::new("other", "svc"), ProblemSource::Degraded);

        f.refresh(Category::Rollout, 1).await;
        let last = f.transport.sent().last().cloned().unwrap();
        assert!(last.content().header.contains("having problems"));
        assert_eq!(last.content().icon, Icon::Warning);
    }

    #[tokio::test]
    async fn test_refresh_swallows_delivery_failure() {
        let mut f = Fixture::new();
        f.acquire(Category::Rollout, 0).await;
        f.heads.record_item(Category::Rollout);
        for _ in 0..5 {
            f.transport.fail_next(DeliveryError::Api("msg_too_long".into()));
        }

        f.refresh(Category::Rollout, 0).await;
        // Left as-is
        assert!(f.heads.is_open(Category::Rollout));
        assert_eq!(f.heads.counter(Category::Rollout), 1);
    }

    #[tokio::test]
    async fn test_reopened_head_counts_carried_over_items() {
        let mut f = Fixture::new();
        f.acquire(Category::Rollout, 0).await;
        f.heads.record_item(Category::Rollout);

        f.clock.advance(Duration::from_secs(3601));
        // One item still open from the old head, one new
        f.acquire(Category::Rollout, 1).await;
        f.heads.record_item(Category::Rollout);
        f.refresh(Category::Rollout, 2).await;

        let last = f.transport.sent().last().cloned().unwrap();
        assert!(last.content().body.starts_with("2/2 still open."));
        assert_eq!(f.heads.counter(Category::Rollout), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_head_is_noop() {
        let mut f = Fixture::new();
        f.refresh(Category::Degraded, 0).await;
        assert!(f.transport.sent().is_empty());
        assert_eq!(f.transport.attempts(), 0);
    }
}
