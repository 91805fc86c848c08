use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace whose workloads are never tracked.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Unique identity of a workload: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Whether this workload lives in the reserved system namespace.
    pub fn is_system(&self) -> bool {
        self.namespace == SYSTEM_NAMESPACE
    }
}

impl std::fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Boolean-like state of a workload condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<&str> for ConditionStatus {
    fn from(value: &str) -> Self {
        match value {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

/// A named status field reported on a workload (e.g. `Progressing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: String,
    pub status: ConditionStatus,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Container image shown in rollout messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
}

/// Point-in-time status of one workload, as delivered by the watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub key: WorkloadKey,
    /// Desired replica count.
    pub desired: u32,
    pub ready: Option<u32>,
    pub updated: Option<u32>,
    pub unavailable: Option<u32>,
    /// Conditions in the order the orchestrator reported them.
    pub conditions: Vec<Condition>,
    pub containers: Vec<ContainerImage>,
}

impl WorkloadSnapshot {
    /// Ready replicas, treating an absent count as zero.
    pub fn ready_count(&self) -> u32 {
        self.ready.unwrap_or(0)
    }

    /// Replicas already running the new version and available:
    /// `max(0, updated - unavailable)`.
    pub fn live_updates(&self) -> u32 {
        self.updated
            .unwrap_or(0)
            .saturating_sub(self.unavailable.unwrap_or(0))
    }

    /// `updated == desired == ready`.
    pub fn rollout_complete(&self) -> bool {
        self.updated == Some(self.desired) && self.ready_count() == self.desired
    }

    /// Latest condition of type `Progressing`, if any was reported.
    pub fn progressing(&self) -> Option<&Condition> {
        self.conditions.iter().rev().find(|c| c.kind == "Progressing")
    }

    /// The rollout has stalled: latest `Progressing` condition is `False`.
    pub fn rollout_failing(&self) -> bool {
        self.progressing()
            .is_some_and(|c| c.status == ConditionStatus::False)
    }
}

/// Identifies a previously sent chat message so it can be updated later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Platform message id (Slack `ts`).
    pub ts: String,
    pub channel: String,
}

impl MessageRef {
    pub fn new(ts: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            channel: channel.into(),
        }
    }
}

/// Where a new item message is nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadAnchor {
    /// Message id of the thread head.
    pub thread_ts: String,
    /// Re-announce the reply to the parent channel.
    pub reply_broadcast: bool,
}

/// Event category; each has its own thread head and active map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Rollout,
    Degraded,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Rollout, Category::Degraded];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Rollout => write!(f, "rollout"),
            Category::Degraded => write!(f, "degraded"),
        }
    }
}

/// One of the four configured status icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Icon {
    Warning,
    Progress,
    Recovering,
    Healthy,
}

/// Message content ready for delivery: bold header plus body with an icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub header: String,
    pub body: String,
    pub icon: Icon,
    /// Resolved URL for `icon`.
    pub icon_url: String,
}

impl MessageContent {
    /// Render the two-block layout: a header section and a body section
    /// with the status image as accessory.
    pub fn blocks(&self) -> serde_json::Value {
        serde_json::json!([
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": self.header }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": self.body },
                "accessory": {
                    "type": "image",
                    "image_url": self.icon_url,
                    "alt_text": "status image"
                }
            }
        ])
    }
}
