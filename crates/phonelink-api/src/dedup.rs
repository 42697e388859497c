//! Bounded, insertion-ordered set of processed event identities.
//!
//! Once full, inserting a new identity evicts the oldest ones. An identity
//! evicted this way can be dispatched again if the same event is delivered
//! later; the capacity bounds memory, not correctness.

use std::collections::{HashSet, VecDeque};

/// Default number of identities retained.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// FIFO-evicting identity set.
#[derive(Debug, Clone)]
pub struct DedupSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupSet {
    /// Creates a set retaining at most `capacity` identities (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// True when `identity` has been recorded and not yet evicted.
    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Records `identity`, evicting the oldest entries beyond capacity.
    ///
    /// Returns the number of evicted entries. Re-inserting a present
    /// identity changes nothing.
    pub fn insert(&mut self, identity: impl Into<String>) -> usize {
        let identity = identity.into();
        if self.members.contains(&identity) {
            return 0;
        }

        self.members.insert(identity.clone());
        self.order.push_back(identity);

        let mut evicted = 0;
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }

    /// Number of identities retained.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of identities retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut set = DedupSet::with_capacity(3);
        for id in ["a", "b", "c"] {
            assert_eq!(set.insert(id), 0);
        }

        assert_eq!(set.insert("d"), 1);

        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("d"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn reinsert_does_not_refresh_position() {
        let mut set = DedupSet::with_capacity(2);
        set.insert("a");
        set.insert("b");
        set.insert("a");
        set.insert("c");

        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
    }

    #[test]
    fn default_capacity_is_one_thousand() {
        let mut set = DedupSet::default();
        for i in 0..1001 {
            set.insert(format!("phone.callee_ended:{i}"));
        }

        assert_eq!(set.capacity(), 1000);
        assert_eq!(set.len(), 1000);
        assert!(!set.contains("phone.callee_ended:0"));
        assert!(set.contains("phone.callee_ended:1000"));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            capacity in 1usize..32,
            ids in proptest::collection::vec("[a-z]{1,3}", 0..200),
        ) {
            let mut set = DedupSet::with_capacity(capacity);
            for id in &ids {
                set.insert(id.as_str());
                prop_assert!(set.len() <= capacity);
                prop_assert_eq!(set.len(), set.members.len());
                prop_assert!(set.contains(id));
            }
        }

        #[test]
        fn matches_fifo_model(ids in proptest::collection::vec(0u32..100, 0..300)) {
            let capacity = 20;
            let mut set = DedupSet::with_capacity(capacity);
            let mut model: VecDeque<String> = VecDeque::new();

            for id in &ids {
                let key = id.to_string();
                if !model.contains(&key) {
                    model.push_back(key.clone());
                    while model.len() > capacity {
                        model.pop_front();
                    }
                }
                set.insert(key);
            }

            prop_assert_eq!(set.len(), model.len());
            for id in 0u32..100 {
                let key = id.to_string();
                prop_assert_eq!(set.contains(&key), model.contains(&key));
            }
        }
    }
}
