//! Problem registry: workloads currently considered failed or unhealthy.
//!
//! Shared by both categories: any flagged workload switches every open
//! thread head to its "having problems" rendering. A failed rollout stays
//! flagged until a new rollout starts for the workload; recovering from a
//! degradation does not clear it.
//!
//! State is held in-memory only. After a restart the registry is rebuilt from
//! the snapshots that follow.

use std::collections::HashMap;

use lookout_common::types::WorkloadKey;

/// Why a workload was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemSource {
    RolloutFailed,
    Degraded,
}

#[derive(Debug, Default)]
pub struct ProblemRegistry {
    entries: HashMap<WorkloadKey, ProblemSource>,
}

impl ProblemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a workload. A rollout failure is never downgraded to a
    /// degradation. Returns `true` if it was not already flagged.
    pub fn mark(&mut self, key: &WorkloadKey, source: ProblemSource) -> bool {
        match self.entries.get_mut(key) {
            Some(existing) => {
                if source == ProblemSource::RolloutFailed {
                    *existing = source;
                }
                false
            }
            None => {
                self.entries.insert(key.clone(), source);
                true
            }
        }
    }

    /// Clear a workload's flag whatever its source. Returns `true` if it was flagged.
    pub fn clear(&mut self, key: &WorkloadKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Clear a flag raised by degradation; rollout failures are kept.
    pub fn clear_recovered(&mut self, key: &WorkloadKey) -> bool {
        if self.entries.get(key) == Some(&ProblemSource::Degraded) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Drop every flag, across both categories.
    pub fn clear_all(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(cleared = self.entries.len(), "Problem registry cleared");
        }
        self.entries.clear();
    }

    pub fn contains(&self, key: &WorkloadKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
