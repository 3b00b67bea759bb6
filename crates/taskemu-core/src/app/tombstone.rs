//! Keyed store that remembers removed names.
//!
//! A removed entry leaves a tombstone under its name, so a later lookup can
//! tell "existed recently" apart from "never existed". Tombstones are never
//! cleared.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
enum Slot<V> {
    Live(V),
    Tombstone,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<'a, V> {
    Live(&'a V),
    Tombstoned,
    Absent,
}

#[derive(Debug)]
pub(crate) struct TombstoneMap<K, V> {
    entries: HashMap<K, Slot<V>>,
}

impl<K, V> Default for TombstoneMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> TombstoneMap<K, V> {
    pub fn get(&self, key: &K) -> Lookup<'_, V> {
        match self.entries.get(key) {
            Some(Slot::Live(value)) => Lookup::Live(value),
            Some(Slot::Tombstone) => Lookup::Tombstoned,
            None => Lookup::Absent,
        }
    }

    /// Insert or replace a live entry, reviving a tombstone.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, Slot::Live(value));
    }

    /// Replace the entry with a tombstone, returning the live value if any.
    pub fn tombstone(&mut self, key: K) -> Option<V> {
        match self.entries.insert(key, Slot::Tombstone) {
            Some(Slot::Live(value)) => Some(value),
            _ => None,
        }
    }

    pub fn live(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().filter_map(|(k, slot)| match slot {
            Slot::Live(v) => Some((k, v)),
            Slot::Tombstone => None,
        })
    }
}
