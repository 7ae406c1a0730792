// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The in-memory cache surface.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tick::Clock;

use crate::lazy::FetchOrigin;
use crate::surface::{CacheResult, EvictionPredicate, ValueFactory};
use crate::telemetry::{CacheActivity, CacheOperation};
use crate::{AppCache, AppPolicyCache, CacheTelemetry, CacheValue, EntityKind, EntryPolicy, LazyStore, Result};

const DEFAULT_NAME: &str = "object";

/// An in-memory [`AppPolicyCache`] backed by a [`LazyStore`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use cohere_cache::{AppCacheExt, AppPolicyCacheExt, EntryPolicy, ObjectCache};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = ObjectCache::builder(Clock::new_frozen()).name("runtime").build();
///
/// cache
///     .insert_value("uRepo_Template_1", String::from("home"), &EntryPolicy::sliding(Duration::from_secs(300)))
///     .await?;
///
/// assert_eq!(cache.get_string("uRepo_Template_1"), Some(Some(String::from("home"))));
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct ObjectCache {
    name: &'static str,
    store: LazyStore<Arc<dyn CacheValue>>,
    telemetry: CacheTelemetry,
}

/// Builder for [`ObjectCache`].
#[derive(Debug)]
pub struct ObjectCacheBuilder {
    clock: Clock,
    name: &'static str,
    telemetry: CacheTelemetry,
}

impl ObjectCacheBuilder {
    /// Sets the name reported in telemetry.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the telemetry recorder.
    #[must_use]
    pub fn telemetry(mut self, telemetry: CacheTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> ObjectCache {
        ObjectCache {
            name: self.name,
            store: LazyStore::new(self.clock),
            telemetry: self.telemetry,
        }
    }
}

impl ObjectCache {
    /// Starts building a cache that measures expiration with `clock`.
    #[must_use]
    pub fn builder(clock: Clock) -> ObjectCacheBuilder {
        ObjectCacheBuilder {
            clock,
            name: DEFAULT_NAME,
            telemetry: CacheTelemetry::default(),
        }
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    async fn lookup(&self, key: &str, factory: ValueFactory<'_>, policy: &EntryPolicy) -> CacheResult {
        let (outcome, origin) = self.store.fetch(key, policy, || factory).await;

        let activity = match (&outcome, origin) {
            (Err(_), _) => CacheActivity::Error,
            (Ok(None), _) => CacheActivity::Absent,
            (Ok(Some(_)), FetchOrigin::Cached) => CacheActivity::Hit,
            (Ok(Some(_)), FetchOrigin::Computed) => CacheActivity::Miss,
            (Ok(Some(_)), FetchOrigin::Joined) => CacheActivity::Coalesced,
        };
        self.telemetry.record(self.name, CacheOperation::Get, activity);

        outcome
    }

    fn record_removed(&self, operation: CacheOperation, removed: usize) {
        if removed > 0 {
            self.telemetry.record(self.name, operation, CacheActivity::Invalidated);
        }
    }
}

impl AppCache for ObjectCache {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get(&self, key: &str) -> Option<Arc<dyn CacheValue>> {
        let value = self.store.get(key);
        let activity = if value.is_some() { CacheActivity::Hit } else { CacheActivity::Miss };
        self.telemetry.record(self.name, CacheOperation::Get, activity);
        value
    }

    fn get_or_insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>) -> BoxFuture<'a, CacheResult> {
        Box::pin(async move { self.lookup(key, factory, &EntryPolicy::none()).await })
    }

    fn search_by_key(&self, prefix: &str) -> Vec<Arc<dyn CacheValue>> {
        self.telemetry.record(self.name, CacheOperation::Search, CacheActivity::Ok);
        self.store.scan(|key| key.starts_with(prefix)).into_iter().map(|(_, v)| v).collect()
    }

    fn search_by_regex(&self, regex: &Regex) -> Vec<Arc<dyn CacheValue>> {
        self.telemetry.record(self.name, CacheOperation::Search, CacheActivity::Ok);
        self.store.scan(|key| regex.is_match(key)).into_iter().map(|(_, v)| v).collect()
    }

    fn clear(&self) {
        self.store.clear();
        self.telemetry.record(self.name, CacheOperation::Clear, CacheActivity::Ok);
    }

    fn clear_key(&self, key: &str) {
        let removed = usize::from(self.store.remove(key));
        self.record_removed(CacheOperation::Invalidate, removed);
    }

    fn clear_of_kind_where(&self, kind: EntityKind, predicate: EvictionPredicate<'_>) {
        let removed = self.store.remove_values(|key, value| {
            value.entity_kind().is_some_and(|runtime| kind.includes(runtime)) && predicate(key, value.as_ref())
        });
        self.record_removed(CacheOperation::Invalidate, removed);
    }

    fn clear_by_key(&self, prefix: &str) {
        let removed = self.store.remove_keys(|key| key.starts_with(prefix));
        self.record_removed(CacheOperation::Invalidate, removed);
    }

    fn clear_by_regex(&self, regex: &Regex) {
        let removed = self.store.remove_keys(|key| regex.is_match(key));
        self.record_removed(CacheOperation::Invalidate, removed);
    }
}

impl AppPolicyCache for ObjectCache {
    fn get_or_insert_with_policy<'a>(
        &'a self,
        key: &'a str,
        factory: ValueFactory<'a>,
        policy: &'a EntryPolicy,
    ) -> BoxFuture<'a, CacheResult> {
        Box::pin(self.lookup(key, factory, policy))
    }

    fn insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>, policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let outcome = self.store.insert(key, policy, || factory).await;
            let activity = if outcome.is_ok() { CacheActivity::Inserted } else { CacheActivity::Error };
            self.telemetry.record(self.name, CacheOperation::Insert, activity);
            outcome
        })
    }
}
