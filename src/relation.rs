//! A many-to-many relation with bidirectional indices.
//!
//! `RelationalMap` keeps two mirrored mappings, `K → set<V>` and `V → set<K>`,
//! in lockstep. It backs the room-membership relation of the WebSocket
//! subsystem, where a connection belongs to any number of rooms and a room
//! holds any number of connections.
//!
//! Invariants upheld after every operation:
//!
//! * `k` relates to `v` in the forward index iff `v` relates to `k` in the
//!   reverse index.
//! * A key is present iff it relates to at least one value, and symmetrically
//!   for values: empty sets are pruned immediately, keeping `keys_count` and
//!   `values_count` accurate.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A many-to-many relation between keys and values.
pub struct RelationalMap<K, V> {
    keys: HashMap<K, HashSet<V>>,
    values: HashMap<V, HashSet<K>>,
}

impl<K, V> RelationalMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash + Clone,
{
    /// Creates an empty relation.
    pub fn new() -> Self {
        RelationalMap {
            keys: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Records the relation `k ↔ v`. Returns `true` iff the relation did not
    /// already exist.
    pub fn relate(&mut self, k: K, v: V) -> bool {
        let inserted = self
            .keys
            .entry(k.clone())
            .or_insert_with(HashSet::new)
            .insert(v.clone());

        if inserted {
            self.values.entry(v).or_insert_with(HashSet::new).insert(k);
        }

        inserted
    }

    /// Removes the relation `k ↔ v`. Returns `true` iff both sides were
    /// present and have been removed.
    pub fn unrelate(&mut self, k: &K, v: &V) -> bool {
        let removed = match self.keys.get_mut(k) {
            Some(set) => set.remove(v),
            None => return false,
        };

        if !removed {
            return false;
        }

        if self.keys.get(k).map(HashSet::is_empty).unwrap_or(false) {
            self.keys.remove(k);
        }

        let values_emptied = match self.values.get_mut(v) {
            Some(set) => {
                set.remove(k);
                set.is_empty()
            }
            None => false,
        };
        if values_emptied {
            self.values.remove(v);
        }

        true
    }

    /// Removes every relation mentioning `k`.
    pub fn drop_key(&mut self, k: &K) {
        if let Some(values) = self.keys.remove(k) {
            for v in values {
                let emptied = match self.values.get_mut(&v) {
                    Some(set) => {
                        set.remove(k);
                        set.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    self.values.remove(&v);
                }
            }
        }
    }

    /// Removes every relation mentioning `v`.
    pub fn drop_value(&mut self, v: &V) {
        if let Some(keys) = self.values.remove(v) {
            for k in keys {
                let emptied = match self.keys.get_mut(&k) {
                    Some(set) => {
                        set.remove(v);
                        set.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    self.keys.remove(&k);
                }
            }
        }
    }

    /// Returns a snapshot of the values related to `k`. The returned set does
    /// not alias internal state.
    pub fn values_of(&self, k: &K) -> HashSet<V> {
        self.keys.get(k).cloned().unwrap_or_default()
    }

    /// Returns a snapshot of the keys related to `v`.
    pub fn keys_of(&self, v: &V) -> HashSet<K> {
        self.values.get(v).cloned().unwrap_or_default()
    }

    /// True iff `k ↔ v` is recorded.
    pub fn has(&self, k: &K, v: &V) -> bool {
        self.keys.get(k).map(|set| set.contains(v)).unwrap_or(false)
    }

    /// True iff `k` relates to at least one value.
    pub fn has_key(&self, k: &K) -> bool {
        self.keys.contains_key(k)
    }

    /// True iff `v` relates to at least one key.
    pub fn has_value(&self, v: &V) -> bool {
        self.values.contains_key(v)
    }

    /// Number of keys with at least one relation.
    pub fn keys_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of values with at least one relation.
    pub fn values_count(&self) -> usize {
        self.values.len()
    }

    /// Drops every relation.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }
}

impl<K, V> Default for RelationalMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash + Clone,
{
    fn default() -> Self {
        RelationalMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checks the lockstep invariants of both indices.
    fn assert_consistent(map: &RelationalMap<&'static str, u32>) {
        for (k, values) in &map.keys {
            assert!(!values.is_empty(), "empty value set retained for a key");
            for v in values {
                assert!(map.keys_of(v).contains(k), "reverse index missing a key");
            }
        }
        for (v, keys) in &map.values {
            assert!(!keys.is_empty(), "empty key set retained for a value");
            for k in keys {
                assert!(map.values_of(k).contains(v), "forward index missing a value");
            }
        }
    }

    #[test]
    fn relate_reports_novelty() {
        let mut map = RelationalMap::new();
        assert!(map.relate("a", 1));
        assert!(!map.relate("a", 1));
        assert!(map.relate("a", 2));
        assert!(map.relate("b", 1));
        assert_eq!(map.keys_count(), 2);
        assert_eq!(map.values_count(), 2);
        assert_consistent(&map);
    }

    #[test]
    fn unrelate_requires_both_sides() {
        let mut map = RelationalMap::new();
        map.relate("a", 1);

        assert!(!map.unrelate(&"a", &2));
        assert!(!map.unrelate(&"b", &1));
        assert!(map.unrelate(&"a", &1));
        assert!(!map.unrelate(&"a", &1));

        assert_eq!(map.keys_count(), 0);
        assert_eq!(map.values_count(), 0);
        assert_consistent(&map);
    }

    #[test]
    fn relate_then_unrelate_restores_prior_state() {
        let mut map = RelationalMap::new();
        map.relate("a", 1);
        map.relate("a", 2);

        let before_values = map.values_of(&"a");
        map.relate("a", 3);
        map.unrelate(&"a", &3);

        assert_eq!(map.values_of(&"a"), before_values);
        assert!(!map.has_value(&3));
        assert_consistent(&map);
    }

    #[test]
    fn drop_key_prunes_orphaned_values() {
        let mut map = RelationalMap::new();
        map.relate("a", 1);
        map.relate("a", 2);
        map.relate("b", 2);

        map.drop_key(&"a");

        assert!(!map.has_key(&"a"));
        assert!(!map.has_value(&1));
        assert!(map.has(&"b", &2));
        assert_eq!(map.values_count(), 1);
        assert_consistent(&map);
    }

    #[test]
    fn drop_value_prunes_orphaned_keys() {
        let mut map = RelationalMap::new();
        map.relate("a", 1);
        map.relate("b", 1);
        map.relate("b", 2);

        map.drop_value(&1);

        assert!(!map.has_key(&"a"));
        assert!(map.has(&"b", &2));
        assert_eq!(map.keys_count(), 1);
        assert_consistent(&map);
    }

    #[test]
    fn snapshots_do_not_alias_internal_state() {
        let mut map = RelationalMap::new();
        map.relate("a", 1);

        let mut snapshot = map.values_of(&"a");
        snapshot.insert(99);

        assert!(!map.has(&"a", &99));
    }

    #[test]
    fn mixed_operation_sequence_keeps_indices_in_lockstep() {
        let mut map = RelationalMap::new();
        let keys = ["a", "b", "c", "d"];

        for round in 0u32..32 {
            let k = keys[(round as usize) % keys.len()];
            match round % 5 {
                0 | 1 => {
                    map.relate(k, round % 7);
                }
                2 => {
                    map.unrelate(&k, &(round % 7));
                }
                3 => map.drop_key(&k),
                _ => map.drop_value(&(round % 7)),
            }
            assert_consistent(&map);
        }

        map.clear();
        assert_eq!(map.keys_count(), 0);
        assert_eq!(map.values_count(), 0);
    }
}
