//! Outstanding document tracking.
//!
//! CREATE and terminal events for the same id can arrive in either order, so
//! two multisets are kept: ids created but not yet terminal, and ids whose
//! terminal event arrived before their creation was seen. Each event cancels
//! one occurrence in the opposite set or adds one to its own.

use std::collections::HashMap;

/// A multiset of document ids.
#[derive(Debug, Default, Clone)]
pub struct IdMultiset {
    counts: HashMap<String, usize>,
    total: usize,
}

impl IdMultiset {
    /// Creates an empty multiset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `id`.
    pub fn add(&mut self, id: &str) {
        *self.counts.entry(id.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    /// Removes one occurrence of `id`, returning whether one was present.
    pub fn remove_one(&mut self, id: &str) -> bool {
        let Some(count) = self.counts.get_mut(id) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(id);
        }
        self.total -= 1;
        true
    }

    /// Occurrences of `id`.
    pub fn count(&self, id: &str) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Total occurrences.
    pub const fn len(&self) -> usize {
        self.total
    }

    /// Whether the multiset is empty.
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Reconciles creation and terminal notifications for one run.
#[derive(Debug, Default, Clone)]
pub struct CompletionTracker {
    pending: IdMultiset,
    early_terminal: IdMultiset,
}

impl CompletionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a document was published or created.
    pub fn on_created(&mut self, id: &str) {
        if !self.early_terminal.remove_one(id) {
            self.pending.add(id);
        }
    }

    /// Records that a document reached a terminal state.
    pub fn on_terminal(&mut self, id: &str) {
        if !self.pending.remove_one(id) {
            self.early_terminal.add(id);
        }
    }

    /// Documents still outstanding.
    pub const fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Terminal notifications not yet matched with a creation.
    pub const fn early_terminal(&self) -> usize {
        self.early_terminal.len()
    }

    /// Whether nothing is outstanding.
    pub const fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiset_counts_duplicates() {
        let mut set = IdMultiset::new();
        set.add("a");
        set.add("a");
        assert_eq!(set.count("a"), 2);
        assert!(set.remove_one("a"));
        assert!(set.remove_one("a"));
        assert!(!set.remove_one("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_create_then_finish() {
        let mut tracker = CompletionTracker::new();
        tracker.on_created("d");
        assert_eq!(tracker.pending(), 1);
        tracker.on_terminal("d");
        assert!(tracker.is_settled());
        assert_eq!(tracker.early_terminal(), 0);
    }

    #[test]
    fn test_finish_before_create_is_not_lost() {
        let mut tracker = CompletionTracker::new();
        tracker.on_terminal("child");
        assert!(tracker.is_settled());
        assert_eq!(tracker.early_terminal(), 1);

        tracker.on_created("child");
        assert!(tracker.is_settled());
        assert_eq!(tracker.early_terminal(), 0);
    }

    #[test]
    fn test_duplicate_publish_needs_two_terminals() {
        let mut tracker = CompletionTracker::new();
        tracker.on_created("d");
        tracker.on_created("d");
        tracker.on_terminal("d");
        assert!(!tracker.is_settled());
        tracker.on_terminal("d");
        assert!(tracker.is_settled());
    }

    #[test]
    fn test_every_interleaving_settles() {
        // Two creations and two terminals of one id plus one of another id,
        // delivered in every order.
        let events = [("a", true), ("a", true), ("a", false), ("a", false), ("b", true), ("b", false)];
        let mut order: Vec<usize> = (0..events.len()).collect();
        let mut permutations = 0;
        loop {
            let mut tracker = CompletionTracker::new();
            for &i in &order {
                let (id, created) = events[i];
                if created {
                    tracker.on_created(id);
                } else {
                    tracker.on_terminal(id);
                }
            }
            assert!(tracker.is_settled(), "order {order:?}");
            assert_eq!(tracker.early_terminal(), 0, "order {order:?}");
            permutations += 1;
            if !next_permutation(&mut order) {
                break;
            }
        }
        assert_eq!(permutations, 720);
    }

    #[test]
    fn test_unmatched_creation_stays_pending() {
        let events = [("a", true), ("a", true), ("a", false)];
        let mut order: Vec<usize> = (0..events.len()).collect();
        loop {
            let mut tracker = CompletionTracker::new();
            for &i in &order {
                let (id, created) = events[i];
                if created {
                    tracker.on_created(id);
                } else {
                    tracker.on_terminal(id);
                }
            }
            assert_eq!(tracker.pending(), 1, "order {order:?}");
            if !next_permutation(&mut order) {
                break;
            }
        }
    }

    fn next_permutation(items: &mut [usize]) -> bool {
        let Some(pivot) = (1..items.len()).rev().find(|&i| items[i - 1] < items[i]) else {
            return false;
        };
        let pivot = pivot - 1;
        let Some(swap) = (pivot + 1..items.len()).rev().find(|&j| items[j] > items[pivot]) else {
            return false;
        };
        items.swap(pivot, swap);
        items[pivot + 1..].reverse();
        true
    }
}
