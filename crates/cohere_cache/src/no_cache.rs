// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::surface::{CacheResult, EvictionPredicate, ValueFactory};
use crate::{AppCache, AppPolicyCache, CacheValue, EntityKind, EntryPolicy, Result};

/// A cache surface that never stores anything.
///
/// Lookups always miss, factories run on every call and evictions do nothing. Used when caching is
/// disabled and as the default request cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAppCache;

impl AppCache for NoAppCache {
    fn name(&self) -> &'static str {
        "none"
    }

    fn get(&self, _key: &str) -> Option<Arc<dyn CacheValue>> {
        None
    }

    fn get_or_insert<'a>(&'a self, _key: &'a str, factory: ValueFactory<'a>) -> BoxFuture<'a, CacheResult> {
        factory
    }

    fn search_by_key(&self, _prefix: &str) -> Vec<Arc<dyn CacheValue>> {
        Vec::new()
    }

    fn search_by_regex(&self, _regex: &Regex) -> Vec<Arc<dyn CacheValue>> {
        Vec::new()
    }

    fn clear(&self) {}

    fn clear_key(&self, _key: &str) {}

    fn clear_of_kind_where(&self, _kind: EntityKind, _predicate: EvictionPredicate<'_>) {}

    fn clear_by_key(&self, _prefix: &str) {}

    fn clear_by_regex(&self, _regex: &Regex) {}
}

impl AppPolicyCache for NoAppCache {
    fn get_or_insert_with_policy<'a>(
        &'a self,
        _key: &'a str,
        factory: ValueFactory<'a>,
        _policy: &'a EntryPolicy,
    ) -> BoxFuture<'a, CacheResult> {
        factory
    }

    fn insert<'a>(&'a self, _key: &'a str, _factory: ValueFactory<'a>, _policy: &'a EntryPolicy) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{AppCacheExt, AppPolicyCacheExt};

    #[test]
    fn factories_run_every_time() {
        futures::executor::block_on(async {
            let cache = NoAppCache;
            let calls = AtomicUsize::new(0);

            for _ in 0..2 {
                let value = cache
                    .get_or_insert_as("k", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Some(1_u32))
                    })
                    .await
                    .expect("factory succeeds");
                assert_eq!(value.as_deref(), Some(&1));
            }

            assert_eq!(calls.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn inserts_are_dropped() {
        futures::executor::block_on(async {
            let cache = NoAppCache;
            cache.insert_value("k", 1_u32, &EntryPolicy::none()).await.expect("insert");

            assert!(cache.get("k").is_none());
            assert!(cache.search_by_key("").is_empty());
            cache.clear_of_kind(EntityKind::Content);
        });
    }
}
