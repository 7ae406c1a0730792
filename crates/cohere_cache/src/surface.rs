// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache surface contract.
//!
//! [`AppCache`] and [`AppPolicyCache`] are object safe so that decorators and registries can hold them as
//! `Arc<dyn AppPolicyCache>`. Typed access goes through the [`AppCacheExt`] and [`AppPolicyCacheExt`]
//! extension traits, which are implemented for every surface.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::value::downcast_arc;
use crate::{CacheValue, EntityKind, EntryPolicy, NullRepresentation, Result};

/// The outcome of a cache lookup that may compute a value.
pub type CacheResult = Result<Option<Arc<dyn CacheValue>>>;

/// A boxed factory producing a value for a missing key.
///
/// The future is only polled if the key is missing; returning `Ok(None)` stores nothing.
pub type ValueFactory<'a> = BoxFuture<'a, CacheResult>;

/// Predicate applied to the key and value of a candidate for eviction.
pub type EvictionPredicate<'a> = &'a (dyn Fn(&str, &dyn CacheValue) -> bool + Send + Sync);

/// A key to value cache.
///
/// Every method is internally synchronized. Eviction never fails: removing a key that is not present is a
/// no-op.
pub trait AppCache: Send + Sync + Debug {
    /// Returns the name of this cache, used in telemetry.
    fn name(&self) -> &'static str;

    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<Arc<dyn CacheValue>>;

    /// Returns the value stored under `key`, computing it with `factory` if missing.
    ///
    /// Concurrent callers for the same missing key share one computation.
    fn get_or_insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>) -> BoxFuture<'a, CacheResult>;

    /// Returns every value whose key starts with `prefix`.
    fn search_by_key(&self, prefix: &str) -> Vec<Arc<dyn CacheValue>>;

    /// Returns every value whose key matches `regex`.
    fn search_by_regex(&self, regex: &Regex) -> Vec<Arc<dyn CacheValue>>;

    /// Removes every entry.
    fn clear(&self);

    /// Removes the entry stored under `key`.
    fn clear_key(&self, key: &str);

    /// Removes every value of `kind` for which `predicate` returns `true`.
    ///
    /// A concrete kind removes exact matches only. A subtype-inclusive kind also removes its member kinds.
    fn clear_of_kind_where(&self, kind: EntityKind, predicate: EvictionPredicate<'_>);

    /// Removes every value of `kind`.
    fn clear_of_kind(&self, kind: EntityKind) {
        self.clear_of_kind_where(kind, &|_, _| true);
    }

    /// Removes every entry whose key starts with `prefix`.
    fn clear_by_key(&self, prefix: &str);

    /// Removes every entry whose key matches `regex`.
    fn clear_by_regex(&self, regex: &Regex);

    /// Returns `true` if the surface hands out deep copies of its values.
    fn clones_values(&self) -> bool {
        false
    }

    /// Releases the content of this cache ahead of the cache being dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store failed to release its resources.
    fn dispose(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}

/// A cache that also accepts per-entry expiration rules.
pub trait AppPolicyCache: AppCache {
    /// Like [`AppCache::get_or_insert`], storing a computed value under `policy`.
    fn get_or_insert_with_policy<'a>(
        &'a self,
        key: &'a str,
        factory: ValueFactory<'a>,
        policy: &'a EntryPolicy,
    ) -> BoxFuture<'a, CacheResult>;

    /// Computes a value with `factory` and stores it under `key` and `policy`, replacing any existing entry.
    ///
    /// A factory yielding `None` removes the existing entry and stores nothing.
    fn insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>, policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>>;
}

fn boxed_factory<'a, T, F, Fut>(factory: F) -> ValueFactory<'a>
where
    T: CacheValue,
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<Option<T>>> + Send + 'a,
{
    Box::pin(async move { Ok(factory().await?.map(|value| Arc::new(value) as Arc<dyn CacheValue>)) })
}

/// Typed access to any [`AppCache`].
///
/// # Example
///
/// ```
/// use cohere_cache::{AppCache, AppCacheExt, ObjectCache};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = ObjectCache::builder(Clock::new_frozen()).name("runtime").build();
///
/// let greeting = cache
///     .get_or_insert_as("greeting", || async { Ok(Some(String::from("hello"))) })
///     .await?;
///
/// assert_eq!(greeting.as_deref().map(String::as_str), Some("hello"));
/// assert!(cache.get_as::<u64>("greeting").is_none());
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
pub trait AppCacheExt: AppCache {
    /// Returns the value under `key` if it is a `T`.
    fn get_as<T: CacheValue>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(downcast_arc::<T>)
    }

    /// Returns a cached string.
    ///
    /// `None` means nothing is cached, `Some(None)` means an absent string was cached with
    /// [`NullRepresentation`].
    fn get_string(&self, key: &str) -> Option<Option<String>> {
        let value = self.get(key)?;
        if value.is::<NullRepresentation>() {
            return Some(None);
        }

        value.downcast_ref::<String>().map(|s| Some(s.clone()))
    }

    /// Returns the `T` under `key`, computing it with `factory` if missing.
    ///
    /// A cached value of another type is reported as absent.
    fn get_or_insert_as<'a, T, F, Fut>(&'a self, key: &'a str, factory: F) -> impl Future<Output = Result<Option<Arc<T>>>> + Send + 'a
    where
        T: CacheValue,
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<T>>> + Send + 'a,
    {
        let lookup = self.get_or_insert(key, boxed_factory(factory));
        async move { Ok(lookup.await?.and_then(downcast_arc::<T>)) }
    }

    /// Returns every `T` whose key starts with `prefix`. Values of other types are skipped.
    fn search_by_key_as<T: CacheValue>(&self, prefix: &str) -> Vec<Arc<T>> {
        self.search_by_key(prefix).into_iter().filter_map(downcast_arc::<T>).collect()
    }

    /// Returns every `T` whose key matches `regex`. Values of other types are skipped.
    fn search_by_regex_as<T: CacheValue>(&self, regex: &Regex) -> Vec<Arc<T>> {
        self.search_by_regex(regex).into_iter().filter_map(downcast_arc::<T>).collect()
    }
}

impl<C: AppCache + ?Sized> AppCacheExt for C {}

/// Typed access to any [`AppPolicyCache`].
pub trait AppPolicyCacheExt: AppPolicyCache {
    /// Returns the `T` under `key`, computing it with `factory` and storing it under `policy` if missing.
    fn get_or_insert_with_policy_as<'a, T, F, Fut>(
        &'a self,
        key: &'a str,
        policy: &'a EntryPolicy,
        factory: F,
    ) -> impl Future<Output = Result<Option<Arc<T>>>> + Send + 'a
    where
        T: CacheValue,
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<T>>> + Send + 'a,
    {
        let lookup = self.get_or_insert_with_policy(key, boxed_factory(factory), policy);
        async move { Ok(lookup.await?.and_then(downcast_arc::<T>)) }
    }

    /// Stores `value` under `key` and `policy`, replacing any existing entry.
    fn insert_value<'a, T: CacheValue>(&'a self, key: &'a str, value: T, policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>> {
        self.insert(key, boxed_factory(move || async move { Ok(Some(value)) }), policy)
    }

    /// Caches an absent string under `key`.
    fn insert_null<'a>(&'a self, key: &'a str, policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>> {
        self.insert_value(key, NullRepresentation, policy)
    }
}

impl<C: AppPolicyCache + ?Sized> AppPolicyCacheExt for C {}
