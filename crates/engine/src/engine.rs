//! Snapshot processing loop.
//!
//! Snapshots are handled strictly one at a time: each is classified, its
//! messages delivered, and the bookkeeping updated before the next one is
//! read. A backoff sleep inside the sender therefore stalls ingestion too.
//!
//! Item-message failures propagate and end the loop. Thread-head refresh
//! failures are logged and ignored (see [`ThreadHeadManager::refresh`]).

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use rand::Rng;

use lookout_common::config::{DisplayConfig, ThreadConfig};
use lookout_common::error::{LookoutError, Result};
use lookout_common::time::{Clock, Sleeper};
use lookout_common::types::{Category, ThreadAnchor, WorkloadSnapshot};
use lookout_notifier::ResilientSender;

use crate::classifier::{Transition, classify};
use crate::composer::{DegradedPhase, NotificationComposer, RolloutPhase};
use crate::registry::{ProblemRegistry, ProblemSource};
use crate::thread_head::{HeadContext, ThreadHeadManager};
use crate::tracking::TrackedItems;

/// More active items than this means tracking has leaked.
pub const MAX_TRACKED: usize = 1000;

/// Pause briefly whenever the active item count hits `n * 10 + 9`.
const BURST_MODULUS: usize = 10;

pub struct LookoutEngine {
    tracked: TrackedItems,
    problems: ProblemRegistry,
    heads: ThreadHeadManager,
    composer: NotificationComposer,
    sender: ResilientSender,
    threads: ThreadConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl LookoutEngine {
    pub fn new(
        display: DisplayConfig,
        threads: ThreadConfig,
        sender: ResilientSender,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            tracked: TrackedItems::new(),
            problems: ProblemRegistry::new(),
            heads: ThreadHeadManager::new(threads.clone(), clock),
            composer: NotificationComposer::new(display),
            sender,
            threads,
            sleeper,
        }
    }

    pub fn tracked(&self) -> &TrackedItems {
        &self.tracked
    }

    pub fn problems(&self) -> &ProblemRegistry {
        &self.problems
    }

    pub fn heads(&self) -> &ThreadHeadManager {
        &self.heads
    }

    /// Consume snapshots until the stream ends or an error propagates.
    pub async fn run<S>(&mut self, snapshots: S) -> Result<()>
    where
        S: Stream<Item = Result<WorkloadSnapshot>>,
    {
        let mut snapshots = std::pin::pin!(snapshots);
        while let Some(snapshot) = snapshots.next().await {
            self.handle(&snapshot?).await?;
        }
        Ok(())
    }

    /// Classify one snapshot and apply the resulting transition.
    pub async fn handle(&mut self, snapshot: &WorkloadSnapshot) -> Result<Transition> {
        if snapshot.key.is_system() {
            return Ok(Transition::Inert);
        }

        self.check_capacity()?;
        self.pace().await;

        let transition = classify(snapshot, &self.tracked);
        match &transition {
            Transition::NewRollout => self.start_rollout(snapshot).await?,
            Transition::RolloutProgress(phase) => self.advance_rollout(snapshot, phase).await?,
            Transition::NewDegradation => self.start_degradation(snapshot).await?,
            Transition::DegradationOngoing => self.update_degradation(snapshot).await?,
            Transition::Recovery => self.recover(snapshot).await?,
            Transition::Inert => {}
        }
        Ok(transition)
    }

    fn check_capacity(&self) -> Result<()> {
        let tracked = self.tracked.total();
        if tracked > MAX_TRACKED {
            tracing::error!(
                tracked,
                limit = MAX_TRACKED,
                "Active item count exceeds limit, aborting"
            );
            return Err(LookoutError::InconsistentState {
                tracked,
                limit: MAX_TRACKED,
            });
        }
        Ok(())
    }

    async fn pace(&self) {
        if self.tracked.total() % BURST_MODULUS == BURST_MODULUS - 1 {
            let secs = rand::thread_rng().gen_range(1..=5);
            tracing::debug!(secs, tracked = self.tracked.total(), "Pacing before next snapshot");
            self.sleeper.sleep(Duration::from_secs(secs)).await;
        }
    }

    async fn acquire_anchor(&mut self, category: Category) -> Result<ThreadAnchor> {
        let remaining = self.tracked.len(category);
        let ctx = HeadContext {
            sender: &self.sender,
            composer: &self.composer,
            problems: &mut self.problems,
        };
        self.heads.acquire(category, remaining, ctx).await
    }

    async fn refresh_head(&mut self, category: Category) {
        let remaining = self.tracked.len(category);
        let ctx = HeadContext {
            sender: &self.sender,
            composer: &self.composer,
            problems: &mut self.problems,
        };
        self.heads.refresh(category, remaining, ctx).await;
    }

    async fn start_rollout(&mut self, snapshot: &WorkloadSnapshot) -> Result<()> {
        let key = &snapshot.key;
        let anchor = self.acquire_anchor(Category::Rollout).await?;

        let content = self.composer.rollout(snapshot, &RolloutPhase::InProgress);
        let message = self
            .sender
            .send_new(self.threads.channel(Category::Rollout), &content, Some(&anchor))
            .await?;

        let evicted = self.tracked.insert(Category::Rollout, key.clone(), message);
        self.heads.record_item(Category::Rollout);
        self.problems.clear(key);
        tracing::info!(key = %key, "Rollout added");

        if let Some(evicted) = evicted {
            tracing::info!(key = %key, from = %evicted, "Rollout supersedes tracked item");
            self.refresh_head(evicted).await;
        }
        self.refresh_head(Category::Rollout).await;
        Ok(())
    }

    async fn advance_rollout(
        &mut self,
        snapshot: &WorkloadSnapshot,
        phase: &RolloutPhase,
    ) -> Result<()> {
        let key = &snapshot.key;
        let Some(current) = self.tracked.get(Category::Rollout, key).cloned() else {
            return Ok(());
        };

        let content = self.composer.rollout(snapshot, phase);
        let message = self
            .sender
            .send_update(&current.channel, &current.ts, &content)
            .await?;

        match phase {
            RolloutPhase::Complete => {
                self.tracked.remove(Category::Rollout, key);
                self.problems.clear(key);
                tracing::info!(key = %key, "Rollout complete");
            }
            RolloutPhase::Failing(reason) => {
                self.tracked.remove(Category::Rollout, key);
                self.problems.mark(key, ProblemSource::RolloutFailed);
                tracing::warn!(key = %key, reason = %reason, "Rollout failing");
            }
            RolloutPhase::InProgress => {
                self.tracked.insert(Category::Rollout, key.clone(), message);
                tracing::info!(
                    key = %key,
                    live = snapshot.live_updates(),
                    desired = snapshot.desired,
                    "Rollout updated"
                );
            }
        }

        self.refresh_head(Category::Rollout).await;
        Ok(())
    }

    async fn start_degradation(&mut self, snapshot: &WorkloadSnapshot) -> Result<()> {
        let key = &snapshot.key;
        let anchor = self.acquire_anchor(Category::Degraded).await?;

        let content = self.composer.degraded(snapshot, DegradedPhase::Detected);
        let message = self
            .sender
            .send_new(self.threads.channel(Category::Degraded), &content, Some(&anchor))
            .await?;

        self.tracked.insert(Category::Degraded, key.clone(), message);
        self.heads.record_item(Category::Degraded);
        self.problems.mark(key, ProblemSource::Degraded);
        tracing::info!(
            key = %key,
            ready = snapshot.ready_count(),
            desired = snapshot.desired,
            "Detected degraded deployment"
        );

        self.refresh_head(Category::Degraded).await;
        Ok(())
    }

    async fn update_degradation(&mut self, snapshot: &WorkloadSnapshot) -> Result<()> {
        let key = &snapshot.key;
        let Some(current) = self.tracked.get(Category::Degraded, key).cloned() else {
            return Ok(());
        };

        let content = self.composer.degraded(snapshot, DegradedPhase::Ongoing);
        let message = self
            .sender
            .send_update(&current.channel, &current.ts, &content)
            .await?;
        self.tracked.insert(Category::Degraded, key.clone(), message);

        self.refresh_head(Category::Degraded).await;
        Ok(())
    }

    async fn recover(&mut self, snapshot: &WorkloadSnapshot) -> Result<()> {
        let key = &snapshot.key;
        let Some(current) = self.tracked.get(Category::Degraded, key).cloned() else {
            return Ok(());
        };

        let content = self.composer.degraded(snapshot, DegradedPhase::Recovered);
        self.sender
            .send_update(&current.channel, &current.ts, &content)
            .await?;

        self.tracked.remove(Category::Degraded, key);
        self.problems.clear_recovered(key);
        tracing::info!(
            key = %key,
            ready = snapshot.ready_count(),
            desired = snapshot.desired,
            "Recovered degraded deployment"
        );

        self.refresh_head(Category::Degraded).await;
        Ok(())
    }
}
