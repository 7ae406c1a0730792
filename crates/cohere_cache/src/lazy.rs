// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The value cache primitive.
//!
//! [`LazyStore`] maps string keys to lazily computed results. Concurrent callers asking for the same missing
//! key share one computation: the first caller runs its factory, everyone else waits on the same cell and
//! receives a clone of the outcome. Absent values and failures are delivered to every waiter and then the
//! entry is evicted, so the next caller computes again.
//!
//! The map lock only guards the decision of which cell a key points to. The factory runs outside of it.
//!
//! The factory runs inside the future of the caller that started it. Dropping that future abandons the
//! computation: nothing is stored, and the next waiter runs its own factory instead. Callers that must
//! not abandon a computation keep polling until it completes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_once_cell::OnceCell;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tick::Clock;

use crate::entry_policy::Expiration;
use crate::{EntryPolicy, Result};

type Outcome<V> = Result<Option<V>>;

struct LazyEntry<V> {
    cell: OnceCell<Outcome<V>>,
    expiration: Expiration,
}

impl<V> LazyEntry<V> {
    fn value(&self) -> Option<&V> {
        match self.cell.get() {
            Some(Ok(Some(value))) => Some(value),
            _ => None,
        }
    }

    fn is_expired(&self, now: std::time::Instant) -> bool {
        self.cell.get().is_some() && self.expiration.is_expired(now)
    }
}

/// How a value returned by [`LazyStore::fetch`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOrigin {
    /// The value was already computed.
    Cached,
    /// This caller ran the factory.
    Computed,
    /// This caller waited on another caller's factory.
    Joined,
}

/// A concurrent key to value store with single-flight computation.
///
/// # Example
///
/// ```
/// use cohere_cache::{EntryPolicy, LazyStore};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let store = LazyStore::<u32>::new(Clock::new_frozen());
///
/// let value = store
///     .get_or_create("answer", &EntryPolicy::none(), || async { Ok(Some(42)) })
///     .await?;
///
/// assert_eq!(value, Some(42));
/// assert_eq!(store.peek("answer"), Some(42));
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
pub struct LazyStore<V> {
    entries: DashMap<String, Arc<LazyEntry<V>>>,
    clock: Clock,
}

impl<V> fmt::Debug for LazyStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyStore").field("entries", &self.entries.len()).finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> LazyStore<V> {
    /// Creates an empty store that measures expiration with `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Returns the clock used for expiration.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Returns the value for `key`, computing it with `factory` if missing.
    ///
    /// The factory runs at most once across concurrent callers for the same key. `Ok(None)` from the factory
    /// is returned but not stored. An error is returned to every waiting caller and the entry is evicted.
    /// If the caller running the factory is dropped first, a waiting caller takes over with its own factory.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the factory.
    pub async fn get_or_create<F, Fut>(&self, key: &str, policy: &EntryPolicy, factory: F) -> Result<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        self.fetch(key, policy, factory).await.0
    }

    pub(crate) async fn fetch<F, Fut>(&self, key: &str, policy: &EntryPolicy, factory: F) -> (Result<Option<V>>, FetchOrigin)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        let entry = self.entry_for(key, policy);

        if let Some(value) = entry.value() {
            entry.expiration.touch(self.clock.instant());
            return (Ok(Some(value.clone())), FetchOrigin::Cached);
        }

        let mut ran = false;
        let outcome = entry
            .cell
            .get_or_init(async {
                ran = true;
                factory().await
            })
            .await;
        let origin = if ran { FetchOrigin::Computed } else { FetchOrigin::Joined };

        match outcome {
            Ok(Some(value)) => {
                entry.expiration.touch(self.clock.instant());
                (Ok(Some(value.clone())), origin)
            }
            Ok(None) => {
                self.evict_entry(key, &entry);
                (Ok(None), origin)
            }
            Err(error) => {
                self.evict_entry(key, &entry);
                (Err(error.clone()), origin)
            }
        }
    }

    /// Returns the value for `key` if it is computed and fresh, renewing a sliding expiration.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.instant();
        let entry = self.live_entry(key, now)?;
        let value = entry.value()?.clone();
        entry.expiration.touch(now);
        Some(value)
    }

    /// Returns the value for `key` only if it is already computed, without triggering or renewing anything.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<V> {
        self.live_entry(key, self.clock.instant())?.value().cloned()
    }

    /// Computes a value with `factory` and stores it under `key`, replacing any existing entry.
    ///
    /// When the factory yields `None` the existing entry is removed and nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the factory; the existing entry is removed in that case too.
    pub async fn insert<F, Fut>(&self, key: &str, policy: &EntryPolicy, factory: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        let computed = factory().await;

        let value = match computed {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.remove(key);
                return Ok(());
            }
            Err(error) => {
                self.remove(key);
                return Err(error);
            }
        };

        let entry = Arc::new(LazyEntry {
            cell: OnceCell::new(),
            expiration: Expiration::start(policy, self.clock.instant()),
        });
        entry.cell.get_or_init(async { Ok(Some(value)) }).await;
        self.entries.insert(key.to_owned(), entry);
        Ok(())
    }

    /// Returns every computed, fresh value whose key satisfies `predicate`.
    ///
    /// Entries still being computed are skipped.
    pub fn scan(&self, mut predicate: impl FnMut(&str) -> bool) -> Vec<(String, V)> {
        let now = self.clock.instant();
        self.entries
            .iter()
            .filter(|e| predicate(e.key()) && !e.value().is_expired(now))
            .filter_map(|e| e.value().value().map(|v| (e.key().clone(), v.clone())))
            .collect()
    }

    /// Removes the entry for `key`. Removing a missing key is a no-op.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry whose key satisfies `predicate`, computed or not.
    pub fn remove_keys(&self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before.saturating_sub(self.entries.len())
    }

    /// Removes every computed entry for which `predicate` returns `true`.
    pub fn remove_values(&self, mut predicate: impl FnMut(&str, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !entry.value().is_some_and(|value| predicate(key, value)));
        before.saturating_sub(self.entries.len())
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns the number of entries, including ones still being computed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live_entry(&self, key: &str, now: std::time::Instant) -> Option<Arc<LazyEntry<V>>> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        if entry.is_expired(now) {
            self.evict_entry(key, &entry);
            return None;
        }

        Some(entry)
    }

    fn entry_for(&self, key: &str, policy: &EntryPolicy) -> Arc<LazyEntry<V>> {
        let now = self.clock.instant();

        if let Some(entry) = self.live_entry(key, now) {
            return entry;
        }

        let fresh = || {
            Arc::new(LazyEntry {
                cell: OnceCell::new(),
                expiration: Expiration::start(policy, now),
            })
        };

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    let entry = fresh();
                    occupied.insert(Arc::clone(&entry));
                    entry
                } else {
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => {
                let entry = fresh();
                vacant.insert(Arc::clone(&entry));
                entry
            }
        }
    }

    fn evict_entry(&self, key: &str, entry: &Arc<LazyEntry<V>>) {
        self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, entry));
    }
}
