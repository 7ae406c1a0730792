// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::surface::{CacheResult, EvictionPredicate, ValueFactory};
use crate::{AppCache, AppPolicyCache, CacheValue, EntityKind, EntryPolicy, Error, ObjectCache, Result};

/// A cache surface decorator that stores and hands out deep copies.
///
/// Values that support deep copies are copied on the way in and again on every retrieval, so no caller can
/// observe another caller's in-place mutation. Copies have their dirty flags cleared. Values without deep
/// copy support are passed through unchanged.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::{AppCacheExt, AppPolicyCacheExt, DeepCloneAppCache, EntryPolicy, ObjectCache};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = DeepCloneAppCache::from(ObjectCache::builder(Clock::new_frozen()).build());
/// cache.insert_value("k", String::from("v"), &EntryPolicy::none()).await?;
///
/// let first = cache.get_as::<String>("k").expect("cached");
/// let second = cache.get_as::<String>("k").expect("cached");
/// assert!(!Arc::ptr_eq(&first, &second));
/// assert_eq!(first, second);
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct DeepCloneAppCache {
    inner: Arc<dyn AppPolicyCache>,
}

impl DeepCloneAppCache {
    /// Wraps `inner`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `inner` already hands out deep copies.
    pub fn new(inner: Arc<dyn AppPolicyCache>) -> Result<Self> {
        if inner.clones_values() {
            return Err(Error::configuration(format!(
                "cache '{}' already clones its values and cannot be wrapped by another cloning cache",
                inner.name()
            )));
        }

        Ok(Self { inner })
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn AppPolicyCache> {
        &self.inner
    }
}

impl From<ObjectCache> for DeepCloneAppCache {
    fn from(inner: ObjectCache) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

fn copy_of(value: Arc<dyn CacheValue>) -> Arc<dyn CacheValue> {
    match value.deep_clone() {
        Some(mut copy) => {
            copy.reset_dirty_properties();
            Arc::from(copy)
        }
        None => value,
    }
}

fn copying(factory: ValueFactory<'_>) -> ValueFactory<'_> {
    Box::pin(async move { Ok(factory.await?.map(copy_of)) })
}

impl AppCache for DeepCloneAppCache {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn get(&self, key: &str) -> Option<Arc<dyn CacheValue>> {
        self.inner.get(key).map(copy_of)
    }

    fn get_or_insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>) -> BoxFuture<'a, CacheResult> {
        Box::pin(async move { Ok(self.inner.get_or_insert(key, copying(factory)).await?.map(copy_of)) })
    }

    fn search_by_key(&self, prefix: &str) -> Vec<Arc<dyn CacheValue>> {
        self.inner.search_by_key(prefix).into_iter().map(copy_of).collect()
    }

    fn search_by_regex(&self, regex: &Regex) -> Vec<Arc<dyn CacheValue>> {
        self.inner.search_by_regex(regex).into_iter().map(copy_of).collect()
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn clear_key(&self, key: &str) {
        self.inner.clear_key(key);
    }

    fn clear_of_kind_where(&self, kind: EntityKind, predicate: EvictionPredicate<'_>) {
        self.inner.clear_of_kind_where(kind, predicate);
    }

    fn clear_by_key(&self, prefix: &str) {
        self.inner.clear_by_key(prefix);
    }

    fn clear_by_regex(&self, regex: &Regex) {
        self.inner.clear_by_regex(regex);
    }

    fn clones_values(&self) -> bool {
        true
    }

    fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }
}

impl AppPolicyCache for DeepCloneAppCache {
    fn get_or_insert_with_policy<'a>(
        &'a self,
        key: &'a str,
        factory: ValueFactory<'a>,
        policy: &'a EntryPolicy,
    ) -> BoxFuture<'a, CacheResult> {
        Box::pin(async move {
            Ok(self
                .inner
                .get_or_insert_with_policy(key, copying(factory), policy)
                .await?
                .map(copy_of))
        })
    }

    fn insert<'a>(&'a self, key: &'a str, factory: ValueFactory<'a>, policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>> {
        self.inner.insert(key, copying(factory), policy)
    }
}

#[cfg(test)]
mod tests {
    use tick::Clock;

    use super::*;
    use crate::value::downcast_arc;
    use crate::{AppCacheExt, AppPolicyCacheExt, CacheTelemetry};

    #[derive(Debug, Clone, PartialEq)]
    struct Article {
        title: String,
        dirty: bool,
    }

    impl CacheValue for Article {
        fn entity_kind(&self) -> Option<EntityKind> {
            Some(EntityKind::Content)
        }

        fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
            Some(Box::new(self.clone()))
        }

        fn reset_dirty_properties(&mut self) {
            self.dirty = false;
        }
    }

    fn object_cache() -> ObjectCache {
        ObjectCache::builder(Clock::new_frozen()).telemetry(CacheTelemetry::disabled()).build()
    }

    #[test]
    fn refuses_to_wrap_a_cloning_cache() {
        let once: Arc<dyn AppPolicyCache> = Arc::new(DeepCloneAppCache::from(object_cache()));
        let error = DeepCloneAppCache::new(once).expect_err("double cloning is rejected");
        assert!(error.is_configuration());
    }

    #[test]
    fn wraps_a_plain_cache() {
        let inner: Arc<dyn AppPolicyCache> = Arc::new(object_cache());
        let cache = DeepCloneAppCache::new(inner).expect("plain cache can be wrapped");
        assert!(cache.clones_values());
        assert!(!cache.inner().clones_values());
    }

    #[test]
    fn retrievals_are_independent_copies() {
        futures::executor::block_on(async {
            let cache = DeepCloneAppCache::from(object_cache());
            let original = Article {
                title: "Hello".into(),
                dirty: true,
            };
            cache.insert_value("a", original, &EntryPolicy::none()).await.expect("insert");

            let mut first = cache.get_as::<Article>("a").expect("cached");
            let second = cache.get_as::<Article>("a").expect("cached");
            assert!(!Arc::ptr_eq(&first, &second));
            assert_eq!(first, second);

            Arc::get_mut(&mut first).expect("copy is uniquely owned").title = "Mutated".into();

            let third = cache.get_as::<Article>("a").expect("cached");
            assert_eq!(second.title, "Hello");
            assert_eq!(third.title, "Hello");
        });
    }

    #[test]
    fn stored_and_returned_copies_are_clean() {
        futures::executor::block_on(async {
            let cache = DeepCloneAppCache::from(object_cache());

            let created = cache
                .get_or_insert_as("a", || async {
                    Ok(Some(Article {
                        title: "Draft".into(),
                        dirty: true,
                    }))
                })
                .await
                .expect("factory succeeds")
                .expect("value is present");

            assert!(!created.dirty);
            let stored = cache.inner().get("a").and_then(downcast_arc::<Article>).expect("stored");
            assert!(!stored.dirty);
        });
    }

    #[test]
    fn values_without_deep_copy_pass_through() {
        futures::executor::block_on(async {
            #[derive(Debug)]
            struct Opaque;
            impl CacheValue for Opaque {}

            let cache = DeepCloneAppCache::from(object_cache());
            cache.insert_value("o", Opaque, &EntryPolicy::none()).await.expect("insert");

            let first = cache.get("o").expect("cached");
            let second = cache.get("o").expect("cached");
            assert!(Arc::ptr_eq(&first, &second));
        });
    }
}
