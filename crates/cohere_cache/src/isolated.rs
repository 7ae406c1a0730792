// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The isolated cache registry.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::{AppPolicyCache, EntityKind, Error};

type CacheFactory = Box<dyn Fn(EntityKind) -> Arc<dyn AppPolicyCache> + Send + Sync>;

/// One independent cache surface per entity kind.
///
/// Surfaces are created lazily on first use. Concurrent first accesses for the same kind observe the same
/// surface. Evicting everything of one kind never scans the entries of another.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::{AppPolicyCache, EntityKind, IsolatedCaches, ObjectCache};
/// use tick::Clock;
///
/// let clock = Clock::new_frozen();
/// let caches = IsolatedCaches::new(move |kind| {
///     Arc::new(ObjectCache::builder(clock.clone()).name(kind.name()).build()) as Arc<dyn AppPolicyCache>
/// });
///
/// let users = caches.get_or_create(EntityKind::User);
/// assert!(Arc::ptr_eq(&users, &caches.get_or_create(EntityKind::User)));
/// assert!(caches.try_get(EntityKind::Content).is_none());
/// ```
pub struct IsolatedCaches {
    caches: DashMap<EntityKind, Arc<dyn AppPolicyCache>>,
    factory: CacheFactory,
}

impl fmt::Debug for IsolatedCaches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<EntityKind> = self.caches.iter().map(|e| *e.key()).collect();
        kinds.sort_unstable();
        f.debug_struct("IsolatedCaches").field("kinds", &kinds).finish_non_exhaustive()
    }
}

impl IsolatedCaches {
    /// Creates an empty registry that builds surfaces with `factory`.
    pub fn new(factory: impl Fn(EntityKind) -> Arc<dyn AppPolicyCache> + Send + Sync + 'static) -> Self {
        Self {
            caches: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Returns the surface of `kind`, creating it on first use.
    pub fn get_or_create(&self, kind: EntityKind) -> Arc<dyn AppPolicyCache> {
        if let Some(cache) = self.try_get(kind) {
            return cache;
        }

        Arc::clone(self.caches.entry(kind).or_insert_with(|| (self.factory)(kind)).value())
    }

    /// Returns the surface of `kind` if it was already created.
    #[must_use]
    pub fn try_get(&self, kind: EntityKind) -> Option<Arc<dyn AppPolicyCache>> {
        self.caches.get(&kind).map(|c| Arc::clone(c.value()))
    }

    /// Clears the surface of `kind`, if any.
    pub fn clear(&self, kind: EntityKind) {
        if let Some(cache) = self.try_get(kind) {
            cache.clear();
        }
    }

    /// Returns the kinds that currently own a surface.
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.caches.iter().map(|e| *e.key()).collect()
    }

    /// Disposes every surface and forgets them all.
    ///
    /// A surface that fails to dispose is logged and reported; the sweep continues with the rest. Surfaces
    /// are taken out one at a time, so every surface that leaves the registry is disposed. One created while
    /// the sweep runs stays registered.
    pub fn clear_all(&self) -> Vec<(EntityKind, Error)> {
        self.kinds()
            .into_iter()
            .filter_map(|kind| self.caches.remove(&kind))
            .filter_map(|(kind, cache)| match cache.dispose() {
                Ok(()) => None,
                Err(error) => {
                    tracing::error!(cache.kind = kind.name(), error = %error, "cache.dispose_failed");
                    Some((kind, error))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    use parking_lot::Mutex;
    use tick::Clock;

    use super::*;
    use crate::{AppCache, AppCacheExt, AppPolicyCacheExt, CacheTelemetry, EntryPolicy, ObjectCache};

    fn registry() -> IsolatedCaches {
        let clock = Clock::new_frozen();
        IsolatedCaches::new(move |kind| {
            Arc::new(
                ObjectCache::builder(clock.clone())
                    .name(kind.name())
                    .telemetry(CacheTelemetry::disabled())
                    .build(),
            ) as Arc<dyn AppPolicyCache>
        })
    }

    #[test]
    fn kinds_are_isolated_even_with_identical_keys() {
        futures::executor::block_on(async {
            let caches = registry();
            let policy = EntryPolicy::none();
            caches.get_or_create(EntityKind::User).insert_value("k", 1_u32, &policy).await.expect("insert");
            caches.get_or_create(EntityKind::Template).insert_value("k", 2_u32, &policy).await.expect("insert");

            caches.clear(EntityKind::User);

            assert!(caches.get_or_create(EntityKind::User).get("k").is_none());
            assert_eq!(caches.get_or_create(EntityKind::Template).get_as::<u32>("k").as_deref(), Some(&2));
        });
    }

    #[test]
    fn factory_runs_once_per_kind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let clock = Clock::new_frozen();
        let caches = IsolatedCaches::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Arc::new(ObjectCache::builder(clock.clone()).build()) as Arc<dyn AppPolicyCache>
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| caches.get_or_create(EntityKind::Content));
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(caches.kinds(), vec![EntityKind::Content]);
    }

    #[test]
    fn clear_of_missing_kind_is_noop() {
        let caches = registry();
        caches.clear(EntityKind::Media);
        assert!(caches.try_get(EntityKind::Media).is_none());
    }

    /// A surface that stores nothing and runs a hook when disposed.
    struct DisposeHook(Box<dyn Fn() -> crate::Result<()> + Send + Sync>);

    impl DisposeHook {
        fn new(hook: impl Fn() -> crate::Result<()> + Send + Sync + 'static) -> Self {
            Self(Box::new(hook))
        }
    }

    impl fmt::Debug for DisposeHook {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("DisposeHook")
        }
    }

    impl AppCache for DisposeHook {
        fn name(&self) -> &'static str {
            "hooked"
        }

        fn get(&self, _key: &str) -> Option<Arc<dyn crate::CacheValue>> {
            None
        }

        fn get_or_insert<'a>(
            &'a self,
            _key: &'a str,
            factory: crate::ValueFactory<'a>,
        ) -> futures::future::BoxFuture<'a, crate::CacheResult> {
            factory
        }

        fn search_by_key(&self, _prefix: &str) -> Vec<Arc<dyn crate::CacheValue>> {
            Vec::new()
        }

        fn search_by_regex(&self, _regex: &regex::Regex) -> Vec<Arc<dyn crate::CacheValue>> {
            Vec::new()
        }

        fn clear(&self) {}

        fn clear_key(&self, _key: &str) {}

        fn clear_of_kind_where(&self, _kind: EntityKind, _predicate: crate::EvictionPredicate<'_>) {}

        fn clear_by_key(&self, _prefix: &str) {}

        fn clear_by_regex(&self, _regex: &regex::Regex) {}

        fn dispose(&self) -> crate::Result<()> {
            (self.0)()
        }
    }

    impl AppPolicyCache for DisposeHook {
        fn get_or_insert_with_policy<'a>(
            &'a self,
            _key: &'a str,
            factory: crate::ValueFactory<'a>,
            _policy: &'a EntryPolicy,
        ) -> futures::future::BoxFuture<'a, crate::CacheResult> {
            factory
        }

        fn insert<'a>(
            &'a self,
            _key: &'a str,
            _factory: crate::ValueFactory<'a>,
            _policy: &'a EntryPolicy,
        ) -> futures::future::BoxFuture<'a, crate::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn clear_all_survives_a_failing_surface() {
        futures::executor::block_on(async {
            let clock = Clock::new_frozen();
            let healthy = Arc::new(ObjectCache::builder(clock).telemetry(CacheTelemetry::disabled()).build());
            let healthy_dyn: Arc<dyn AppPolicyCache> = Arc::clone(&healthy) as Arc<dyn AppPolicyCache>;
            let caches = IsolatedCaches::new(move |kind| {
                if kind == EntityKind::User {
                    Arc::new(DisposeHook::new(|| Err(Error::configuration("dispose failed")))) as Arc<dyn AppPolicyCache>
                } else {
                    Arc::clone(&healthy_dyn)
                }
            });

            caches.get_or_create(EntityKind::User);
            caches
                .get_or_create(EntityKind::Template)
                .insert_value("k", 1_u32, &EntryPolicy::none())
                .await
                .expect("insert");

            let failures = caches.clear_all();

            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, EntityKind::User);
            assert!(healthy.is_empty());
            assert!(caches.kinds().is_empty());
        });
    }

    #[test]
    fn every_forgotten_surface_is_disposed() {
        let registry: Arc<OnceLock<Weak<IsolatedCaches>>> = Arc::default();
        let disposed = Arc::new(Mutex::new(Vec::new()));

        let (weak, seen) = (Arc::clone(&registry), Arc::clone(&disposed));
        let caches = Arc::new(IsolatedCaches::new(move |kind| {
            let (weak, seen) = (Arc::clone(&weak), Arc::clone(&seen));
            Arc::new(DisposeHook::new(move || {
                seen.lock().push(kind);
                // A surface appearing mid-sweep.
                if kind == EntityKind::User
                    && let Some(caches) = weak.get().and_then(Weak::upgrade)
                {
                    caches.get_or_create(EntityKind::Language);
                }
                Ok(())
            })) as Arc<dyn AppPolicyCache>
        }));
        registry.set(Arc::downgrade(&caches)).expect("set once");

        caches.get_or_create(EntityKind::User);
        caches.get_or_create(EntityKind::Template);
        assert!(caches.clear_all().is_empty());

        let mut swept = disposed.lock().clone();
        swept.sort_unstable();
        let mut expected = vec![EntityKind::User, EntityKind::Template];
        expected.sort_unstable();
        assert_eq!(swept, expected);
        assert_eq!(caches.kinds(), vec![EntityKind::Language]);

        assert!(caches.clear_all().is_empty());
        assert!(disposed.lock().contains(&EntityKind::Language));
        assert!(caches.kinds().is_empty());
    }
}
