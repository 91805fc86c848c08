//! Active item maps: which workloads currently have a live message per category.

use std::collections::HashMap;

use lookout_common::types::{Category, MessageRef, WorkloadKey};

/// One value per event category.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PerCategory<T> {
    pub rollout: T,
    pub degraded: T,
}

impl<T> PerCategory<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Rollout => &self.rollout,
            Category::Degraded => &self.degraded,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Rollout => &mut self.rollout,
            Category::Degraded => &mut self.degraded,
        }
    }
}

/// `TrackedRollout` and `TrackedDegradation`.
///
/// A key is never present in both maps: inserting into one category removes
/// it from the other.
#[derive(Debug, Default)]
pub struct TrackedItems {
    maps: PerCategory<HashMap<WorkloadKey, MessageRef>>,
}

impl TrackedItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category, key: &WorkloadKey) -> Option<&MessageRef> {
        self.maps.get(category).get(key)
    }

    pub fn contains(&self, category: Category, key: &WorkloadKey) -> bool {
        self.maps.get(category).contains_key(key)
    }

    /// Start or continue tracking `key` under `category`.
    ///
    /// Returns the category the key was evicted from, if it was tracked
    /// under the other one.
    pub fn insert(
        &mut self,
        category: Category,
        key: WorkloadKey,
        message: MessageRef,
    ) -> Option<Category> {
        let other = match category {
            Category::Rollout => Category::Degraded,
            Category::Degraded => Category::Rollout,
        };
        let evicted = self.maps.get_mut(other).remove(&key).map(|_| other);
        self.maps.get_mut(category).insert(key, message);
        evicted
    }

    pub fn remove(&mut self, category: Category, key: &WorkloadKey) -> Option<MessageRef> {
        self.maps.get_mut(category).remove(key)
    }

    /// Number of active items in one category.
    pub fn len(&self, category: Category) -> usize {
        self.maps.get(category).len()
    }

    /// Active items across both categories.
    pub fn total(&self) -> usize {
        self.maps.rollout.len() + self.maps.degraded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: &str) -> MessageRef {
        MessageRef::new(ts, "#c")
    }

    #[test]
    fn test_insert_evicts_other_category() {
        let mut items = TrackedItems::new();
        let key = WorkloadKey::new("ns", "app");

        assert_eq!(items.insert(Category::Degraded, key.clone(), msg("1")), None);
        assert_eq!(
            items.insert(Category::Rollout, key.clone(), msg("2")),
            Some(Category::Degraded)
        );
        assert!(items.contains(Category::Rollout, &key));
        assert!(!items.contains(Category::Degraded, &key));
        assert_eq!(items.total(), 1);
    }

    #[test]
    fn test_counts_per_category() {
        let mut items = TrackedItems::new();
        items.insert(Category::Rollout, WorkloadKey::new("a", "1"), msg("1"));
        items.insert(Category::Rollout, WorkloadKey::new("a", "2"), msg("2"));
        items.insert(Category::Degraded, WorkloadKey::new("b", "1"), msg("3"));

        assert_eq!(items.len(Category::Rollout), 2);
        assert_eq!(items.len(Category::Degraded), 1);
        assert_eq!(items.total(), 3);

        assert_eq!(
            items.remove(Category::Rollout, &WorkloadKey::new("a", "1")),
            Some(msg("1"))
        );
        assert_eq!(items.len(Category::Rollout), 1);
    }
}
