// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tick::Clock;

use crate::{AppCache, AppPolicyCache, CacheTelemetry, DeepCloneAppCache, IsolatedCaches, NoAppCache, ObjectCache};

/// The caches of one server process.
///
/// Holds the runtime cache shared by the whole process, the request cache (whose backing store belongs to
/// the host) and the isolated caches used by repositories. Isolated caches hand out deep copies.
///
/// # Example
///
/// ```
/// use cohere_cache::{AppCache, AppCaches, EntityKind};
/// use tick::Clock;
///
/// let caches = AppCaches::builder(Clock::new_frozen()).build();
/// assert!(caches.isolated_caches().get_or_create(EntityKind::Content).clones_values());
/// ```
#[derive(Debug, Clone)]
pub struct AppCaches {
    runtime_cache: Arc<dyn AppPolicyCache>,
    request_cache: Arc<dyn AppCache>,
    isolated_caches: Arc<IsolatedCaches>,
}

/// Builder for [`AppCaches`].
#[derive(Debug)]
pub struct AppCachesBuilder {
    clock: Clock,
    telemetry: CacheTelemetry,
    request_cache: Arc<dyn AppCache>,
}

impl AppCachesBuilder {
    /// Sets the telemetry recorder used by every cache.
    #[must_use]
    pub fn telemetry(mut self, telemetry: CacheTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Sets the request cache. Defaults to [`NoAppCache`].
    #[must_use]
    pub fn request_cache(mut self, cache: Arc<dyn AppCache>) -> Self {
        self.request_cache = cache;
        self
    }

    /// Builds the caches.
    #[must_use]
    pub fn build(self) -> AppCaches {
        let runtime_cache = ObjectCache::builder(self.clock.clone())
            .name("runtime")
            .telemetry(self.telemetry.clone())
            .build();

        let clock = self.clock;
        let telemetry = self.telemetry;
        let isolated_caches = IsolatedCaches::new(move |kind| {
            let inner = ObjectCache::builder(clock.clone())
                .name(kind.name())
                .telemetry(telemetry.clone())
                .build();
            Arc::new(DeepCloneAppCache::from(inner)) as Arc<dyn AppPolicyCache>
        });

        AppCaches {
            runtime_cache: Arc::new(runtime_cache),
            request_cache: self.request_cache,
            isolated_caches: Arc::new(isolated_caches),
        }
    }
}

impl AppCaches {
    /// Starts building the caches of a process.
    #[must_use]
    pub fn builder(clock: Clock) -> AppCachesBuilder {
        AppCachesBuilder {
            clock,
            telemetry: CacheTelemetry::default(),
            request_cache: Arc::new(NoAppCache),
        }
    }

    /// Creates caches that never store anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            runtime_cache: Arc::new(NoAppCache),
            request_cache: Arc::new(NoAppCache),
            isolated_caches: Arc::new(IsolatedCaches::new(|_| Arc::new(NoAppCache) as Arc<dyn AppPolicyCache>)),
        }
    }

    /// Returns the process-wide runtime cache.
    #[must_use]
    pub fn runtime_cache(&self) -> &Arc<dyn AppPolicyCache> {
        &self.runtime_cache
    }

    /// Returns the request cache.
    #[must_use]
    pub fn request_cache(&self) -> &Arc<dyn AppCache> {
        &self.request_cache
    }

    /// Returns the per-kind isolated caches.
    #[must_use]
    pub fn isolated_caches(&self) -> &Arc<IsolatedCaches> {
        &self.isolated_caches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppPolicyCacheExt, EntityKind, EntryPolicy};

    #[test]
    fn disabled_caches_store_nothing() {
        futures::executor::block_on(async {
            let caches = AppCaches::disabled();
            caches
                .runtime_cache()
                .insert_value("k", 1_u32, &EntryPolicy::none())
                .await
                .expect("insert");

            assert!(caches.runtime_cache().get("k").is_none());
            assert!(!caches.isolated_caches().get_or_create(EntityKind::User).clones_values());
        });
    }

    #[test]
    fn runtime_cache_is_not_cloning() {
        let caches = AppCaches::builder(Clock::new_frozen()).telemetry(CacheTelemetry::disabled()).build();
        assert!(!caches.runtime_cache().clones_values());
        assert_eq!(caches.runtime_cache().name(), "runtime");
        assert_eq!(caches.request_cache().name(), "none");
    }
}
