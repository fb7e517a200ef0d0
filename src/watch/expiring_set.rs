// src/watch/expiring_set.rs

//! A set whose members expire a fixed time after they were first added.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;

/// Set with a per-entry time-to-live, backed by a `moka` cache.
///
/// The TTL counts from the moment an element was *first* added: adding an
/// element that is still present does not extend its lifetime. This is what
/// turns the set into a suppression window: a burst of inserts for the same
/// key inside the window yields exactly one `true`.
#[derive(Clone)]
pub struct ExpiringSet<K> {
    entries: Cache<K, ()>,
    ttl: Duration,
}

impl<K> fmt::Debug for ExpiringSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringSet")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<K> ExpiringSet<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
            ttl,
        }
    }

    /// Add `key` to the set.
    ///
    /// Returns `true` if the key was not present (never added, or added more
    /// than one TTL ago), `false` if it is still inside its window. Concurrent
    /// inserts of the same key observe exactly one `true`.
    pub fn insert(&self, key: K) -> bool {
        self.entries.entry(key).or_insert(()).is_fresh()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.invalidate(key);
    }
}
