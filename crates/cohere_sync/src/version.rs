// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Version stamps per entity kind, used to detect a cache that missed invalidation messages.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cohere_cache::{EntityKind, Error, Result};
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tick::{Clock, FutureExt as _};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An opaque stamp identifying one generation of the cached data of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(Uuid);

impl CacheVersion {
    /// Mints a new, random version.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps a version read back from storage.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the version as stored.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Shared storage of the current version of every entity kind.
///
/// Callers access the store under a [`VersionLock`].
pub trait VersionStore: Send + Sync {
    /// Returns the stored version of `kind`, or `None` if the kind was never stamped.
    fn get(&self, kind: EntityKind) -> impl Future<Output = Result<Option<CacheVersion>>> + Send;

    /// Stores `version` as the current version of `kind`.
    fn save(&self, kind: EntityKind, version: CacheVersion) -> impl Future<Output = Result<()>> + Send;

    /// Returns every stamped kind with its version.
    fn get_all(&self) -> impl Future<Output = Result<Vec<(EntityKind, CacheVersion)>>> + Send;
}

/// A [`VersionStore`] kept in process memory.
///
/// Clones share the same versions, so servers simulated in one process see each other's stamps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVersionStore {
    versions: Arc<Mutex<HashMap<EntityKind, CacheVersion>>>,
}

impl InMemoryVersionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for InMemoryVersionStore {
    fn get(&self, kind: EntityKind) -> impl Future<Output = Result<Option<CacheVersion>>> + Send {
        future::ready(Ok(self.versions.lock().get(&kind).copied()))
    }

    fn save(&self, kind: EntityKind, version: CacheVersion) -> impl Future<Output = Result<()>> + Send {
        self.versions.lock().insert(kind, version);
        future::ready(Ok(()))
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<(EntityKind, CacheVersion)>>> + Send {
        let mut all: Vec<_> = self.versions.lock().iter().map(|(kind, version)| (*kind, *version)).collect();
        all.sort_by_key(|(kind, _)| kind.name());
        future::ready(Ok(all))
    }
}

/// Reader/writer lock guarding the version store across servers.
///
/// A deployment with a shared database implements this with a database lock; readers check versions, the
/// single writer stamps a new one.
pub trait VersionLock: Send + Sync {
    /// Held while versions are read.
    type ReadGuard: Send;
    /// Held while a version is stamped.
    type WriteGuard: Send;

    /// Acquires the lock for reading.
    fn read(&self) -> impl Future<Output = Result<Self::ReadGuard>> + Send;

    /// Acquires the lock for writing.
    fn write(&self) -> impl Future<Output = Result<Self::WriteGuard>> + Send;
}

/// A [`VersionLock`] that only excludes writers within this process.
///
/// Clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct InProcessVersionLock {
    lock: Arc<RwLock<()>>,
}

impl InProcessVersionLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionLock for InProcessVersionLock {
    type ReadGuard = OwnedRwLockReadGuard<()>;
    type WriteGuard = OwnedRwLockWriteGuard<()>;

    async fn read(&self) -> Result<Self::ReadGuard> {
        Ok(Arc::clone(&self.lock).read_owned().await)
    }

    async fn write(&self) -> Result<Self::WriteGuard> {
        Ok(Arc::clone(&self.lock).write_owned().await)
    }
}

/// Configuration of a [`RepositoryCacheVersionService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionServiceOptions {
    /// Upper bound on each operation, lock acquisition included.
    pub timeout: Duration,
}

impl Default for VersionServiceOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

/// Tells whether the local caches of an entity kind still match the data of record.
///
/// Every write that commits stamps a new version for its kind. A server whose remembered version differs
/// from the stored one missed an invalidation and must reload that kind's isolated cache, then adopt the
/// stored version with [`CacheVersionService::set_cache_synced`].
pub trait CacheVersionService: Send + Sync + Debug {
    /// Returns `true` if the local caches of `kind` are current.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    fn is_cache_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<bool>>;

    /// Stamps a new version for `kind` after a committed write and remembers it locally.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    fn set_cache_updated(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>>;

    /// Adopts the stored version of `kind` after the local caches were reloaded.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    fn set_cache_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>>;

    /// Adopts the stored versions of every kind.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    fn set_caches_synced(&self) -> BoxFuture<'_, Result<()>>;
}

/// A [`CacheVersionService`] for a deployment with a single server: always synced, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleServerCacheVersionService;

impl CacheVersionService for SingleServerCacheVersionService {
    fn is_cache_synced(&self, _kind: EntityKind) -> BoxFuture<'_, Result<bool>> {
        Box::pin(future::ready(Ok(true)))
    }

    fn set_cache_updated(&self, _kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn set_cache_synced(&self, _kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn set_caches_synced(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// A [`CacheVersionService`] backed by a shared [`VersionStore`].
///
/// The service remembers, per kind, the version it last saw. The first check of a kind records the stored
/// version (possibly none) and reports synced: an empty cache trivially matches. A kind that was never
/// stamped is synced by definition.
///
/// # Example
///
/// ```
/// use cohere_cache::EntityKind;
/// use cohere_sync::{
///     InMemoryVersionStore, InProcessVersionLock, RepositoryCacheVersionService, VersionServiceOptions,
/// };
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let store = InMemoryVersionStore::new();
/// let node_a = RepositoryCacheVersionService::new(
///     store.clone(),
///     InProcessVersionLock::new(),
///     Clock::new_frozen(),
///     VersionServiceOptions::default(),
/// );
/// let node_b = RepositoryCacheVersionService::new(
///     store,
///     InProcessVersionLock::new(),
///     Clock::new_frozen(),
///     VersionServiceOptions::default(),
/// );
///
/// assert!(node_b.is_cache_synced(EntityKind::User).await?);
/// node_a.set_cache_updated(EntityKind::User).await?;
/// assert!(!node_b.is_cache_synced(EntityKind::User).await?);
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
pub struct RepositoryCacheVersionService<S, L> {
    store: S,
    lock: L,
    clock: Clock,
    options: VersionServiceOptions,
    local: Mutex<HashMap<EntityKind, Option<CacheVersion>>>,
}

impl<S: VersionStore, L: VersionLock> RepositoryCacheVersionService<S, L> {
    /// Creates a service reading and stamping versions in `store` under `lock`.
    #[must_use]
    pub fn new(store: S, lock: L, clock: Clock, options: VersionServiceOptions) -> Self {
        Self {
            store,
            lock,
            clock,
            options,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the version store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the version this server remembers for `kind`.
    ///
    /// The outer `None` means the kind was never checked; the inner `None` means it was not stamped when it
    /// was last checked.
    #[must_use]
    pub fn local_version(&self, kind: EntityKind) -> Option<Option<CacheVersion>> {
        self.local.lock().get(&kind).copied()
    }

    /// Returns `true` if the local caches of `kind` are current.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error if the check takes longer
    /// than the configured timeout.
    pub async fn is_cache_synced(&self, kind: EntityKind) -> Result<bool> {
        self.is_cache_synced_with_timeout(kind, self.options.timeout).await
    }

    /// Returns `true` if the local caches of `kind` are current, giving up after `timeout`.
    ///
    /// Dropping the returned future abandons the check and releases the lock.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    pub async fn is_cache_synced_with_timeout(&self, kind: EntityKind, timeout: Duration) -> Result<bool> {
        let synced = self.bounded(timeout, self.check(kind)).await?;
        tracing::debug!(version.kind = kind.name(), version.operation = "check", version.synced = synced, "version.event");
        Ok(synced)
    }

    /// Stamps a new version for `kind` after a committed write and remembers it locally.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    pub async fn set_cache_updated(&self, kind: EntityKind) -> Result<()> {
        let version = self.bounded(self.options.timeout, self.stamp(kind)).await?;
        tracing::debug!(version.kind = kind.name(), version.operation = "update", version.token = %version, "version.event");
        Ok(())
    }

    /// Adopts the stored version of `kind` after the local caches were reloaded.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    pub async fn set_cache_synced(&self, kind: EntityKind) -> Result<()> {
        self.bounded(self.options.timeout, self.adopt(kind)).await?;
        tracing::debug!(version.kind = kind.name(), version.operation = "sync", "version.event");
        Ok(())
    }

    /// Adopts the stored versions of every kind.
    ///
    /// # Errors
    ///
    /// Returns a version store error if the store or lock fails, or a timeout error.
    pub async fn set_caches_synced(&self) -> Result<()> {
        let count = self.bounded(self.options.timeout, self.adopt_all()).await?;
        tracing::debug!(version.count = count, version.operation = "sync_all", "version.event");
        Ok(())
    }

    async fn bounded<T>(&self, timeout: Duration, operation: impl Future<Output = Result<T>>) -> Result<T> {
        operation.timeout(&self.clock, timeout).await.map_err(Error::timeout)?
    }

    async fn check(&self, kind: EntityKind) -> Result<bool> {
        let _guard = self.lock.read().await.map_err(Error::version_store)?;
        let stored = self.store.get(kind).await.map_err(Error::version_store)?;

        let mut local = self.local.lock();
        let Some(remembered) = local.get(&kind).copied() else {
            local.insert(kind, stored);
            return Ok(true);
        };

        Ok(stored.is_none() || remembered == stored)
    }

    async fn stamp(&self, kind: EntityKind) -> Result<CacheVersion> {
        let _guard = self.lock.write().await.map_err(Error::version_store)?;
        let version = CacheVersion::new();
        self.store.save(kind, version).await.map_err(Error::version_store)?;
        self.local.lock().insert(kind, Some(version));
        Ok(version)
    }

    async fn adopt(&self, kind: EntityKind) -> Result<()> {
        let _guard = self.lock.read().await.map_err(Error::version_store)?;
        let stored = self.store.get(kind).await.map_err(Error::version_store)?;
        self.local.lock().insert(kind, stored);
        Ok(())
    }

    async fn adopt_all(&self) -> Result<usize> {
        let _guard = self.lock.read().await.map_err(Error::version_store)?;
        let all = self.store.get_all().await.map_err(Error::version_store)?;

        let mut local = self.local.lock();
        for remembered in local.values_mut() {
            *remembered = None;
        }
        for (kind, version) in &all {
            local.insert(*kind, Some(*version));
        }
        Ok(all.len())
    }
}

impl<S, L> Debug for RepositoryCacheVersionService<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryCacheVersionService")
            .field("options", &self.options)
            .field("local", &*self.local.lock())
            .finish_non_exhaustive()
    }
}

impl<S, L> CacheVersionService for RepositoryCacheVersionService<S, L>
where
    S: VersionStore + 'static,
    L: VersionLock + 'static,
{
    fn is_cache_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<bool>> {
        Box::pin(Self::is_cache_synced(self, kind))
    }

    fn set_cache_updated(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(Self::set_cache_updated(self, kind))
    }

    fn set_cache_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(Self::set_cache_synced(self, kind))
    }

    fn set_caches_synced(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(Self::set_caches_synced(self))
    }
}
