// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The composition root wiring caches, refreshers, messaging and version checks for one server process.

use std::fmt;
use std::sync::Arc;

use cohere_cache::{AppCache, AppCaches, AppCachesBuilder, CacheTelemetry, EntityKind, Result};
use cohere_repository::{CacheSync, SyncedRepositoryCachePolicy};
use cohere_sync::refreshers::{
    ContentCacheRefresher, ContentTypeCacheRefresher, DataTypeCacheRefresher, DomainCacheRefresher,
    LanguageCacheRefresher, PublicAccessCacheRefresher, TemplateCacheRefresher, UserCacheRefresher,
};
use cohere_sync::{
    BatchedMessenger, BatchedMessengerOptions, CacheRefresher, CacheRefresherRegistry, CacheVersionService,
    DistributedCache, InstructionProcessor, InstructionProcessorOptions, InstructionStore, LocalOnlyMessenger,
    RefresherEntry, RefresherNotifications, RepositoryCacheVersionService, ServerMessenger,
    SingleServerCacheVersionService, VersionLock, VersionServiceOptions, VersionStore, local_identity,
};
use futures::future::BoxFuture;
use tick::Clock;

type RefresherFactory = Box<dyn FnOnce(&AppCaches) -> RefresherEntry>;

/// Builder for [`CacheRuntime`].
///
/// Without further configuration the runtime suits a single server: instructions are dropped and every kind
/// is always synced.
#[must_use]
pub struct CacheRuntimeBuilder {
    clock: Clock,
    caches: AppCachesBuilder,
    notifications: RefresherNotifications,
    messenger: Option<Arc<dyn ServerMessenger>>,
    origin: Option<String>,
    versions: Option<Arc<dyn CacheVersionService>>,
    refreshers: Vec<RefresherFactory>,
}

impl CacheRuntimeBuilder {
    fn new(clock: Clock) -> Self {
        Self {
            caches: AppCaches::builder(clock.clone()),
            clock,
            notifications: RefresherNotifications::new(),
            messenger: None,
            origin: None,
            versions: None,
            refreshers: Vec::new(),
        }
    }

    /// Sets the telemetry recorder used by every cache.
    pub fn telemetry(mut self, telemetry: CacheTelemetry) -> Self {
        self.caches = self.caches.telemetry(telemetry);
        self
    }

    /// Sets the request cache, whose backing store belongs to the host.
    pub fn request_cache(mut self, cache: Arc<dyn AppCache>) -> Self {
        self.caches = self.caches.request_cache(cache);
        self
    }

    /// Sets the hub refresher notifications are published to.
    pub fn notifications(mut self, notifications: RefresherNotifications) -> Self {
        self.notifications = notifications;
        self
    }

    /// Queues instructions through `messenger`, stamping batches with `origin`.
    pub fn messenger(mut self, messenger: Arc<dyn ServerMessenger>, origin: impl Into<String>) -> Self {
        self.messenger = Some(messenger);
        self.origin = Some(origin.into());
        self
    }

    /// Queues instructions in the shared instruction log `store`.
    pub fn batched<S>(self, store: S, options: BatchedMessengerOptions) -> Self
    where
        S: InstructionStore + fmt::Debug + 'static,
    {
        let messenger = BatchedMessenger::new(store, options);
        let origin = messenger.origin().to_owned();
        self.messenger(Arc::new(messenger), origin)
    }

    /// Sets the version service.
    pub fn versions(mut self, versions: Arc<dyn CacheVersionService>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Stamps and checks versions in the shared `store` under `lock`.
    pub fn shared_versions<S, L>(self, store: S, lock: L, options: VersionServiceOptions) -> Self
    where
        S: VersionStore + 'static,
        L: VersionLock + 'static,
    {
        let service = RepositoryCacheVersionService::new(store, lock, self.clock.clone(), options);
        self.versions(Arc::new(service))
    }

    /// Registers a refresher besides the built-in ones.
    ///
    /// `factory` receives the caches of the runtime being built.
    pub fn refresher<F, E>(mut self, factory: F) -> Self
    where
        F: FnOnce(&AppCaches) -> E + 'static,
        E: Into<RefresherEntry>,
    {
        self.refreshers.push(Box::new(move |caches| factory(caches).into()));
        self
    }

    /// Builds the runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if two refreshers share an identifier.
    pub fn build(self) -> Result<CacheRuntime> {
        let caches = self.caches.build();

        let mut registry = CacheRefresherRegistry::builder()
            .notifications(self.notifications)
            .register(RefresherEntry::new(ContentCacheRefresher::new(caches.clone())).by_payload())
            .register(RefresherEntry::new(ContentTypeCacheRefresher::new(caches.clone())).by_payload())
            .register(RefresherEntry::new(DataTypeCacheRefresher::new(caches.clone())).by_payload())
            .register(RefresherEntry::new(LanguageCacheRefresher::new(caches.clone())).by_payload())
            .register(RefresherEntry::new(DomainCacheRefresher::new(caches.clone())).by_payload())
            .register(RefresherEntry::new(UserCacheRefresher::new(caches.clone())).by_id())
            .register(RefresherEntry::new(TemplateCacheRefresher::new(caches.clone())).by_id())
            .register(RefresherEntry::new(PublicAccessCacheRefresher::new(caches.clone())));
        for factory in self.refreshers {
            registry = registry.register(factory(&caches));
        }
        let registry = Arc::new(registry.build()?);

        let messenger = self.messenger.unwrap_or_else(|| Arc::new(LocalOnlyMessenger));
        let origin = self.origin.unwrap_or_else(local_identity);
        let versions = self.versions.unwrap_or_else(|| Arc::new(SingleServerCacheVersionService));

        tracing::info!(
            runtime.origin = %origin,
            runtime.refreshers = registry.refresher_ids().len(),
            "runtime.started"
        );

        Ok(CacheRuntime {
            distributed: DistributedCache::new(Arc::clone(&registry), messenger).with_versions(Arc::clone(&versions)),
            caches,
            registry,
            versions,
            origin,
            clock: self.clock,
        })
    }
}

impl fmt::Debug for CacheRuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRuntimeBuilder")
            .field("caches", &self.caches)
            .field("messenger", &self.messenger)
            .field("origin", &self.origin)
            .field("versions", &self.versions)
            .field("refreshers", &self.refreshers.len())
            .finish_non_exhaustive()
    }
}

/// Caches, refreshers, messaging and version checks of one server process.
///
/// Every refresh dispatched through [`CacheRuntime::distributed`] also stamps a new version of the
/// refresher's kind. Policies wrapped with [`CacheRuntime::synced`] reconcile their kind before each read,
/// so a server that never received an instruction still drops what another server changed.
///
/// # Example
///
/// ```
/// use cohere::refreshers::UserCacheRefresher;
/// use cohere::{CacheRuntime, EntityKind};
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let runtime = CacheRuntime::builder(Clock::new_frozen()).build()?;
///
/// runtime.distributed().refresh_ids::<UserCacheRefresher>(&[1, 2]).await?;
/// assert!(!runtime.reconcile(EntityKind::User).await?);
/// # Ok::<(), cohere::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CacheRuntime {
    caches: AppCaches,
    registry: Arc<CacheRefresherRegistry>,
    distributed: DistributedCache,
    versions: Arc<dyn CacheVersionService>,
    origin: String,
    clock: Clock,
}

impl CacheRuntime {
    /// Starts building a runtime timed by `clock`.
    pub fn builder(clock: Clock) -> CacheRuntimeBuilder {
        CacheRuntimeBuilder::new(clock)
    }

    /// Returns the caches of this process.
    #[must_use]
    pub fn caches(&self) -> &AppCaches {
        &self.caches
    }

    /// Returns the refresher registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CacheRefresherRegistry> {
        &self.registry
    }

    /// Returns the hub refresher notifications are published to.
    #[must_use]
    pub fn notifications(&self) -> &RefresherNotifications {
        self.registry.notifications()
    }

    /// Returns the dispatcher that applies refreshes locally and queues them for peers.
    #[must_use]
    pub fn distributed(&self) -> &DistributedCache {
        &self.distributed
    }

    /// Returns the version service.
    #[must_use]
    pub fn versions(&self) -> &Arc<dyn CacheVersionService> {
        &self.versions
    }

    /// Returns the identity stamped on the instructions this process queues.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the registered refresher of type `R`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `R` is not registered.
    pub fn refresher<R: CacheRefresher>(&self) -> Result<Arc<R>> {
        self.registry.get::<R>()
    }

    /// Creates a processor applying the instructions peers append to `store`.
    ///
    /// Batches stamped with this runtime's origin are skipped. The processor throttles and prunes by the
    /// runtime's clock.
    #[must_use]
    pub fn processor<S: InstructionStore>(&self, store: S, options: InstructionProcessorOptions) -> InstructionProcessor<S> {
        InstructionProcessor::new(
            store,
            Arc::clone(&self.registry),
            self.origin.clone(),
            options,
            self.clock.clone(),
        )
    }

    /// Wraps `policy` so that each of its reads first reconciles the policy's kind.
    #[must_use]
    pub fn synced<P>(&self, policy: P) -> SyncedRepositoryCachePolicy<P> {
        SyncedRepositoryCachePolicy::new(policy, Arc::new(self.clone()))
    }

    /// Discards the local caches of `kind` if they missed a change, then adopts the stored version.
    ///
    /// Returns `true` if the caches were discarded. Repositories reload the kind on their next read.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the version service fails, or a timeout error.
    pub async fn reconcile(&self, kind: EntityKind) -> Result<bool> {
        if self.versions.is_cache_synced(kind).await? {
            return Ok(false);
        }

        self.caches.isolated_caches().clear(kind);
        self.caches.runtime_cache().clear_of_kind(kind);
        self.versions.set_cache_synced(kind).await?;

        tracing::info!(version.kind = kind.name(), "version.reloaded");
        Ok(true)
    }
}

impl CacheSync for CacheRuntime {
    fn ensure_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.reconcile(kind).await.map(drop) })
    }
}
