//! Snapshot classification.
//!
//! Rules are evaluated top-to-bottom; the first rule that returns a
//! transition wins. Each rule only reads the snapshot and the tracked maps,
//! so they can be tested without delivering anything.

use lookout_common::types::{Category, WorkloadSnapshot};

use crate::composer::RolloutPhase;
use crate::tracking::TrackedItems;

/// What a snapshot means for its workload right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Start tracking a rollout with a new item message.
    NewRollout,
    /// Update the tracked rollout's message; terminal unless in progress.
    RolloutProgress(RolloutPhase),
    /// First sighting of a degraded workload.
    NewDegradation,
    /// Still degraded; update in place.
    DegradationOngoing,
    /// Degraded workload back at full strength.
    Recovery,
    /// Nothing to do for this workload at this time.
    Inert,
}

pub type Rule = fn(&WorkloadSnapshot, &TrackedItems) -> Option<Transition>;

/// Classification rules in priority order.
pub const RULES: [(&str, Rule); 4] = [
    ("new_rollout", new_rollout),
    ("ongoing_rollout", ongoing_rollout),
    ("degradation", degradation),
    ("recovery", recovery),
];

/// Untracked workload whose updated-replica count is absent.
///
/// Rollout tracking starts when `updated` is unset, which is the observed
/// behavior of the watch this was built against.
// TODO: confirm against a live cluster whether rollouts with a reported
// `updatedReplicas` should also start tracking here.
pub fn new_rollout(snapshot: &WorkloadSnapshot, tracked: &TrackedItems) -> Option<Transition> {
    (!tracked.contains(Category::Rollout, &snapshot.key) && snapshot.updated.is_none())
        .then_some(Transition::NewRollout)
}

pub fn ongoing_rollout(snapshot: &WorkloadSnapshot, tracked: &TrackedItems) -> Option<Transition> {
    tracked
        .contains(Category::Rollout, &snapshot.key)
        .then(|| Transition::RolloutProgress(RolloutPhase::of(snapshot)))
}

/// Fewer ready replicas than desired.
pub fn degradation(snapshot: &WorkloadSnapshot, tracked: &TrackedItems) -> Option<Transition> {
    if snapshot.ready_count() >= snapshot.desired {
        return None;
    }
    Some(if tracked.contains(Category::Degraded, &snapshot.key) {
        Transition::DegradationOngoing
    } else {
        Transition::NewDegradation
    })
}

pub fn recovery(snapshot: &WorkloadSnapshot, tracked: &TrackedItems) -> Option<Transition> {
    (tracked.contains(Category::Degraded, &snapshot.key)
        && snapshot.ready_count() >= snapshot.desired)
        .then_some(Transition::Recovery)
}

/// Run the rules in order and return the first match.
pub fn classify(snapshot: &WorkloadSnapshot, tracked: &TrackedItems) -> Transition {
    for (name, rule) in RULES {
        if let Some(transition) = rule(snapshot, tracked) {
            tracing::debug!(key = %snapshot.key, rule = name, ?transition, "Snapshot classified");
            return transition;
        }
    }
    Transition::Inert
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_common::types::{Condition, ConditionStatus, MessageRef, WorkloadKey};

    fn snapshot(desired: u32, ready: Option<u32>, updated: Option<u32>) -> WorkloadSnapshot {
        WorkloadSnapshot {
            key: WorkloadKey::new("ns", "app"),
            desired,
            ready,
            updated,
            unavailable: None,
            conditions: vec![],
            containers: vec![],
        }
    }

    fn tracked_in(category: Category) -> TrackedItems {
        let mut items = TrackedItems::new();
        items.insert(category, WorkloadKey::new("ns", "app"), MessageRef::new("1", "#c"));
        items
    }

    #[test]
    fn test_new_rollout_requires_absent_updated_count() {
        let empty = TrackedItems::new();
        assert_eq!(new_rollout(&snapshot(3, None, None), &empty), Some(Transition::NewRollout));
        assert_eq!(new_rollout(&snapshot(3, None, Some(1)), &empty), None);
        assert_eq!(
            new_rollout(&snapshot(3, None, None), &tracked_in(Category::Rollout)),
            None
        );
    }

    #[test]
    fn test_new_rollout_wins_over_degradation() {
        // ready < desired but updated is unset: the rollout rule comes first
        let transition = classify(&snapshot(3, Some(0), None), &tracked_in(Category::Degraded));
        assert_eq!(transition, Transition::NewRollout);
    }

    #[test]
    fn test_ongoing_rollout_phases() {
        let tracked = tracked_in(Category::Rollout);
        assert_eq!(
            classify(&snapshot(3, Some(2), Some(2)), &tracked),
            Transition::RolloutProgress(RolloutPhase::InProgress)
        );
        assert_eq!(
            classify(&snapshot(3, Some(3), Some(3)), &tracked),
            Transition::RolloutProgress(RolloutPhase::Complete)
        );

        let mut failing = snapshot(3, Some(1), Some(1));
        failing.conditions.push(Condition {
            kind: "Progressing".to_string(),
            status: ConditionStatus::False,
            message: "ProgressDeadlineExceeded".to_string(),
            timestamp: None,
        });
        assert_eq!(
            classify(&failing, &tracked),
            Transition::RolloutProgress(RolloutPhase::Failing(
                "ProgressDeadlineExceeded".to_string()
            ))
        );
    }

    #[test]
    fn test_degradation_new_and_ongoing() {
        assert_eq!(
            classify(&snapshot(5, Some(2), Some(5)), &TrackedItems::new()),
            Transition::NewDegradation
        );
        assert_eq!(
            classify(&snapshot(5, Some(3), Some(5)), &tracked_in(Category::Degraded)),
            Transition::DegradationOngoing
        );
        // absent ready count counts as zero
        assert_eq!(
            classify(&snapshot(1, None, Some(1)), &TrackedItems::new()),
            Transition::NewDegradation
        );
    }

    #[test]
    fn test_recovery_and_inert() {
        assert_eq!(
            classify(&snapshot(5, Some(5), Some(5)), &tracked_in(Category::Degraded)),
            Transition::Recovery
        );
        assert_eq!(
            classify(&snapshot(5, Some(5), Some(5)), &TrackedItems::new()),
            Transition::Inert
        );
    }
}
