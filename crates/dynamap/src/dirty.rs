//! Dirty tracking
//!
//! The tracker holds the clean snapshot of one item: the attribute values as
//! of the last successful load or save. An attribute is dirty when its
//! current value differs from the snapshot. Unset and nil compare equal.

use std::collections::{HashMap, HashSet};

use dynamap_common::Value;

static NULL: Value = Value::Null;

fn or_null(value: Option<&Value>) -> &Value {
    value.unwrap_or(&NULL)
}

/// Clean snapshot and assignment flags for one item instance.
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    clean: HashMap<String, Value>,
    assigned: HashSet<String>,
    track_mutations: bool,
}

impl DirtyTracker {
    #[must_use]
    pub fn new(track_mutations: bool) -> Self {
        Self {
            clean: HashMap::new(),
            assigned: HashSet::new(),
            track_mutations,
        }
    }

    /// Whether `current` differs from the snapshot of `name`.
    ///
    /// Without mutation tracking only attributes assigned since the last
    /// clean are compared, so changes made in place go unnoticed.
    #[must_use]
    pub fn attribute_dirty(&self, name: &str, current: Option<&Value>) -> bool {
        if !self.track_mutations && !self.assigned.contains(name) {
            return false;
        }
        or_null(current) != or_null(self.clean.get(name))
    }

    pub fn record_assignment(&mut self, name: &str) {
        if !self.assigned.contains(name) {
            self.assigned.insert(name.to_string());
        }
    }

    /// Snapshot value of `name`, `None` when it was unset
    #[must_use]
    pub fn was(&self, name: &str) -> Option<&Value> {
        self.clean.get(name).filter(|v| !v.is_null())
    }

    /// Replace the snapshot with a deep copy of `current`.
    pub fn clean(&mut self, current: &HashMap<String, Value>) {
        self.clean = current.clone();
        self.assigned.clear();
    }

    /// Forget the assignment flag of one attribute after it was rolled back
    pub fn clear_assignment(&mut self, name: &str) {
        self.assigned.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_identical_value_is_clean() {
        let mut tracker = DirtyTracker::new(true);
        tracker.clean(&snapshot(&[("name", Value::from("a"))]));

        assert!(!tracker.attribute_dirty("name", Some(&Value::from("a"))));
        assert!(tracker.attribute_dirty("name", Some(&Value::from("b"))));
    }

    #[test]
    fn test_unset_and_nil_are_equal() {
        let tracker = DirtyTracker::new(true);
        assert!(!tracker.attribute_dirty("name", None));
        assert!(!tracker.attribute_dirty("name", Some(&Value::Null)));
        assert!(tracker.attribute_dirty("name", Some(&Value::from(1i64))));
    }

    #[test]
    fn test_container_changes_are_structural() {
        let mut tracker = DirtyTracker::new(true);
        let list = Value::from(vec![1i64, 2]);
        tracker.clean(&snapshot(&[("list", list.clone())]));

        let mut current = list;
        if let Value::List(items) = &mut current {
            items.push(Value::Integer(3));
        }
        assert!(tracker.attribute_dirty("list", Some(&current)));
    }

    #[test]
    fn test_without_mutation_tracking_only_assignments_count() {
        let mut tracker = DirtyTracker::new(false);
        tracker.clean(&snapshot(&[("list", Value::from(vec![1i64]))]));

        let mutated = Value::from(vec![1i64, 2]);
        assert!(!tracker.attribute_dirty("list", Some(&mutated)));

        tracker.record_assignment("list");
        assert!(tracker.attribute_dirty("list", Some(&mutated)));
        assert!(!tracker.attribute_dirty("list", Some(&Value::from(vec![1i64]))));

        tracker.clean(&snapshot(&[("list", mutated.clone())]));
        assert!(!tracker.attribute_dirty("list", Some(&mutated)));
    }

    #[test]
    fn test_was_hides_nil() {
        let mut tracker = DirtyTracker::new(true);
        tracker.clean(&snapshot(&[("a", Value::Null), ("b", Value::Integer(1))]));
        assert_eq!(tracker.was("a"), None);
        assert_eq!(tracker.was("b"), Some(&Value::Integer(1)));
        assert_eq!(tracker.was("c"), None);
    }
}
