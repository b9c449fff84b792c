//! Static subscriber sets.
//!
//! Subscriptions are fixed at group startup and never change during a run.
//! The table is read-only after construction and needs no synchronization.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum supported group size (64 processes).
/// Using a u64 bitset allows tracking up to 64 processes efficiently.
pub const MAX_GROUP_SIZE: u32 = 64;

/// A compact bitset of process identifiers.
///
/// Bit N is set if process N belongs to the set.
///
/// # Performance
/// - `insert`/`contains`: O(1) bitwise ops
/// - `count`: O(1) popcount
/// - Memory: 8 bytes vs ~48+ bytes for a HashSet
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberSet(u64);

impl SubscriberSet {
    /// Create an empty set.
    #[inline]
    pub fn new() -> Self {
        SubscriberSet(0)
    }

    /// Create a set from a slice of process ids.
    pub fn of(ids: &[u32]) -> Self {
        let mut set = SubscriberSet::new();
        for &id in ids {
            set.insert(id);
        }
        set
    }

    /// Add a process to the set.
    #[inline]
    pub fn insert(&mut self, process: u32) {
        debug_assert!(process < MAX_GROUP_SIZE, "process id exceeds MAX_GROUP_SIZE");
        self.0 |= 1u64 << process;
    }

    /// Check membership.
    #[inline]
    pub fn contains(&self, process: u32) -> bool {
        debug_assert!(process < MAX_GROUP_SIZE, "process id exceeds MAX_GROUP_SIZE");
        (self.0 & (1u64 << process)) != 0
    }

    /// Number of members.
    #[inline]
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// True if the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate members in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..MAX_GROUP_SIZE).filter(move |&id| self.contains(id))
    }
}

impl fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Static mapping from variable name to its subscriber set.
///
/// Loaded once at startup; by protocol convention the sequencer's own id
/// should belong to every set it sequences for. That convention is not
/// enforced here — see the node documentation for what breaks without it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTable {
    entries: HashMap<String, SubscriberSet>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        SubscriptionTable {
            entries: HashMap::new(),
        }
    }

    /// Declare a variable with its subscriber set.
    ///
    /// Redeclaring a variable replaces its set; tables are built once before
    /// the group starts, so this only matters to construction code.
    pub fn declare(&mut self, var: &str, subscribers: SubscriberSet) {
        self.entries.insert(var.to_string(), subscribers);
    }

    /// The subscriber set of a variable, if declared.
    pub fn subscribers(&self, var: &str) -> Option<SubscriberSet> {
        self.entries.get(var).copied()
    }

    /// True if `process` may mutate and observe `var`.
    pub fn is_subscriber(&self, var: &str, process: u32) -> bool {
        self.subscribers(var)
            .map(|set| set.contains(process))
            .unwrap_or(false)
    }

    /// Iterate declared variable names (in no particular order).
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|name| name.as_str())
    }

    /// Number of declared variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no variables are declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_set_basics() {
        let mut set = SubscriberSet::new();
        assert!(set.is_empty());

        set.insert(0);
        set.insert(2);
        set.insert(63);

        assert!(set.contains(0));
        assert!(!set.contains(1));
        assert!(set.contains(2));
        assert!(set.contains(63));
        assert_eq!(set.count(), 3);

        let members: Vec<u32> = set.iter().collect();
        assert_eq!(members, vec![0, 2, 63]);
    }

    #[test]
    fn test_subscriber_set_of() {
        let set = SubscriberSet::of(&[2, 0, 2]);
        assert_eq!(set.count(), 2);
        assert_eq!(set, SubscriberSet::of(&[0, 2]));
    }

    #[test]
    fn test_table_lookup() {
        let mut table = SubscriptionTable::new();
        table.declare("A", SubscriberSet::of(&[0, 2]));
        table.declare("B", SubscriberSet::of(&[0, 1, 2]));

        assert!(table.is_subscriber("A", 0));
        assert!(table.is_subscriber("A", 2));
        assert!(!table.is_subscriber("A", 1));
        assert!(table.is_subscriber("B", 1));

        // Unknown variables have no subscribers at all.
        assert!(!table.is_subscriber("Z", 0));
        assert!(table.subscribers("Z").is_none());

        let mut vars: Vec<&str> = table.variables().collect();
        vars.sort_unstable();
        assert_eq!(vars, vec!["A", "B"]);
    }
}
