//! Notification composer: turns a workload snapshot and an outcome into
//! message content.
//!
//! Pure: output depends only on the snapshot, the outcome and the display
//! configuration fixed at startup.

use lookout_common::config::DisplayConfig;
use lookout_common::types::{Category, Icon, MessageContent, WorkloadSnapshot};

/// Number of cells in a progress bar; each cell is 5%.
const BAR_CELLS: u64 = 20;
const FILLED_CELL: &str = "⬛";
const EMPTY_CELL: &str = "⬜";

/// State of a tracked rollout as shown in its item message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutPhase {
    InProgress,
    /// Carries the message of the failing `Progressing` condition.
    Failing(String),
    Complete,
}

impl RolloutPhase {
    /// Completion wins over failure; anything else is still in progress.
    pub fn of(snapshot: &WorkloadSnapshot) -> Self {
        if snapshot.rollout_complete() {
            RolloutPhase::Complete
        } else if snapshot.rollout_failing() {
            let message = snapshot
                .progressing()
                .map(|c| c.message.clone())
                .unwrap_or_default();
            RolloutPhase::Failing(message)
        } else {
            RolloutPhase::InProgress
        }
    }
}

/// State of a degraded item message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedPhase {
    /// First detection; posts a new message.
    Detected,
    /// Still degraded on a later snapshot; updates in place.
    Ongoing,
    Recovered,
}

/// Aggregate state rendered on a thread head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadStatus {
    Progressing,
    /// At least one workload is in the problem registry.
    Problems,
    Complete,
    TimedOut,
}

/// Textual progress bar of 20 cells, `position / max` filled.
///
/// A zero `max` counts as 1. Out-of-range positions are clamped.
pub fn progress_bar(position: u32, max: u32) -> String {
    let max = u64::from(max.max(1));
    let filled = (u64::from(position) * BAR_CELLS / max).min(BAR_CELLS) as usize;
    let mut bar = FILLED_CELL.repeat(filled);
    bar.push_str(&EMPTY_CELL.repeat(BAR_CELLS as usize - filled));
    bar.push('\n');
    bar
}

pub struct NotificationComposer {
    display: DisplayConfig,
}

impl NotificationComposer {
    pub fn new(display: DisplayConfig) -> Self {
        Self { display }
    }

    fn content(&self, header: String, body: String, icon: Icon) -> MessageContent {
        MessageContent {
            header,
            body,
            icon,
            icon_url: self.display.icons.url(icon).to_string(),
        }
    }

    fn console_link(&self, snapshot: &WorkloadSnapshot) -> String {
        format!(
            "https://console.cloud.google.com/kubernetes/deployment/{}/{}/{}/{}/overview?project={}",
            self.display.region,
            self.display.cluster_name,
            snapshot.key.namespace,
            snapshot.key.name,
            self.display.project
        )
    }

    /// Item message for a tracked rollout.
    pub fn rollout(&self, snapshot: &WorkloadSnapshot, phase: &RolloutPhase) -> MessageContent {
        let project = &self.display.project;
        let key = &snapshot.key;

        let (header, icon) = match phase {
            RolloutPhase::InProgress => (
                format!("*{project} deployment {key} is rolling out an update.*"),
                Icon::Progress,
            ),
            RolloutPhase::Failing(reason) => (
                format!("*{project} deployment {key} is failing: {reason}*"),
                Icon::Warning,
            ),
            RolloutPhase::Complete => (
                format!("*{project} deployment {key} has finished rolling out.*"),
                Icon::Healthy,
            ),
        };

        // One line per container, each carrying the console link
        let link = self.console_link(snapshot);
        let mut body = String::new();
        for container in &snapshot.containers {
            body.push_str(&format!(
                "Container {} has image _ {} __ {link} _\n",
                container.name, container.image
            ));
        }
        body.push('\n');

        let live = snapshot.live_updates();
        body.push_str(&format!(
            "{live} replicas updated out of {}, {} ready.\n\n",
            snapshot.desired,
            snapshot.ready_count()
        ));
        body.push_str(&progress_bar(live, snapshot.desired));

        self.content(header, body, icon)
    }

    /// Item message for a degraded (or recovered) workload.
    pub fn degraded(&self, snapshot: &WorkloadSnapshot, phase: DegradedPhase) -> MessageContent {
        let project = &self.display.project;
        let key = &snapshot.key;
        let ready = snapshot.ready_count();
        let desired = snapshot.desired;

        let (header, body, icon) = match phase {
            DegradedPhase::Detected | DegradedPhase::Ongoing => (
                format!("*{project} deployment {key} has become degraded.*"),
                format!(
                    "Deployment {key} has {ready} ready replicas when it should have {desired}.\n"
                ),
                if phase == DegradedPhase::Detected {
                    Icon::Warning
                } else {
                    Icon::Recovering
                },
            ),
            DegradedPhase::Recovered => (
                format!("*{project} deployment {key} is no longer in a degraded state.*"),
                format!("Deployment {key} has {ready} ready replicas out of {desired}.\n"),
                Icon::Healthy,
            ),
        };

        self.content(header, body + &progress_bar(ready, desired), icon)
    }

    /// Aggregate thread-head message. The bar fills as items leave the
    /// active map: `filled = total - remaining`.
    pub fn thread_head(
        &self,
        category: Category,
        status: HeadStatus,
        remaining: usize,
        total: usize,
    ) -> MessageContent {
        let project = &self.display.project;

        let (header, icon) = match (status, category) {
            (HeadStatus::Progressing, Category::Rollout) => (
                format!("*Kubernetes deployments in {project} are rolling out*"),
                Icon::Progress,
            ),
            (HeadStatus::Progressing, Category::Degraded) => (
                format!("*Kubernetes deployments in {project} are degraded*"),
                Icon::Progress,
            ),
            (HeadStatus::Problems, _) => (
                format!("*Kubernetes deployments in {project} are having problems*"),
                Icon::Warning,
            ),
            (HeadStatus::Complete, Category::Rollout) => (
                format!("*Kubernetes deployment rollouts in {project} are complete*"),
                Icon::Healthy,
            ),
            (HeadStatus::Complete, Category::Degraded) => (
                format!("*Degraded Kubernetes deployments in {project} have recovered*"),
                Icon::Healthy,
            ),
            (HeadStatus::TimedOut, _) => (
                format!("*Kubernetes {category} thread in {project} timed out*"),
                Icon::Warning,
            ),
        };

        let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        let mut body = format!(
            "{remaining}/{total} still open. See the thread under this message for details.\n"
        );
        body.push_str(&progress_bar(total.saturating_sub(remaining), total));

        self.content(header, body, icon)
    }
}
