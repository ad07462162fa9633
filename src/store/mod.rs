//! # Replicated state
//!
//! The control plane keeps its source of truth in named, cluster-replicated
//! maps. The contract is a mapping from K to V with cluster-wide
//! linearisable put/get/remove; [`ReplicatedMap`] is the in-process mirror
//! of one such map. Readers take a shared lock, writers an exclusive one;
//! cross-node coherence is the concern of the backing replication layer,
//! which is why keys and values are required to be serialisable.

pub mod status;

pub use status::{StatusStore, StatusUpdate};

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// In-process mirror of one named replicated map
#[derive(Debug)]
pub struct ReplicatedMap<K, V> {
    name: &'static str,
    inner: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for ReplicatedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ReplicatedMap<K, V>
where
    K: Eq + Hash + Clone + Serialize,
    V: Clone + Serialize,
{
    /// Create the mirror of the named map
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The replicated map's cluster-wide name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Linearisable read
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Linearisable write; returns the previous value
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Linearisable removal; returns the removed value
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Atomic read-modify-write of one entry
    ///
    /// The closure receives the current value and returns the new one;
    /// `None` removes the entry. Runs under the exclusive lock so that
    /// concurrent updaters cannot clobber each other.
    pub fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(Option<V>) -> Option<V>,
    {
        let mut guard = self.inner.write();
        let current = guard.get(&key).cloned();
        match f(current) {
            Some(next) => {
                guard.insert(key, next.clone());
                Some(next)
            }
            None => {
                guard.remove(&key);
                None
            }
        }
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Snapshot of all keys
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }

    /// Remove every entry failing the predicate
    pub fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.inner.write().retain(|k, v| f(k, v));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
