// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache policies bound to a unit of work.
//!
//! A [`CacheScope`] owns caches private to one unit of work. Policies created through
//! [`ScopedRepositoryCachePolicy`] read and write those private caches, and every write records which
//! entries of the shared caches it makes stale. Completing the scope hands those records back as a
//! [`PendingInvalidation`], which the transaction executor applies to the shared caches after the commit.
//! Dropping the scope without applying it leaves the shared caches untouched, which is what a rollback needs.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use cohere_cache::{AppPolicyCache, CacheTelemetry, DeepCloneAppCache, EntityKind, IsolatedCaches, ObjectCache, Result, keys};
use parking_lot::Mutex;
use tick::Clock;

use crate::{CachedEntity, EntityStore, RepositoryCachePolicy};

/// One stale target in a shared cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// One key of the isolated cache of a kind.
    Key {
        /// The kind whose isolated cache holds the key.
        kind: EntityKind,
        /// The stale key.
        key: String,
    },
    /// Everything cached for a kind.
    Kind(EntityKind),
}

/// The invalidations a completed unit of work owes to the shared caches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "a pending invalidation does nothing until it is applied"]
pub struct PendingInvalidation {
    targets: Vec<Invalidation>,
}

impl PendingInvalidation {
    /// Returns the recorded targets, in recording order.
    #[must_use]
    pub fn targets(&self) -> &[Invalidation] {
        &self.targets
    }

    /// Returns `true` if nothing needs to be invalidated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Evicts every recorded target from `caches`.
    ///
    /// Kinds whose cache was never created hold nothing stale and are skipped.
    pub fn apply(self, caches: &IsolatedCaches) {
        for target in self.targets {
            match target {
                Invalidation::Key { kind, key } => {
                    if let Some(cache) = caches.try_get(kind) {
                        cache.clear_key(&key);
                    }
                }
                Invalidation::Kind(kind) => caches.clear(kind),
            }
        }
    }

    fn push(&mut self, target: Invalidation) {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
    }
}

/// The cache context of one unit of work.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::{AppCaches, EntityKind};
/// use cohere_repository::{
///     CacheScope, CachedEntity, DefaultRepositoryCachePolicy, RepositoryCachePolicy, ScopedRepositoryCachePolicy,
/// };
/// use tick::Clock;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Template {
///     id: i32,
/// }
///
/// impl CachedEntity for Template {
///     const KIND: EntityKind = EntityKind::Template;
///     type Id = i32;
///
///     fn id(&self) -> i32 {
///         self.id
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let caches = AppCaches::builder(clock.clone()).build();
///
/// let scope = Arc::new(CacheScope::new(clock));
/// let policy = ScopedRepositoryCachePolicy::<Template, _>::new(&scope, |cache| {
///     DefaultRepositoryCachePolicy::new(cache, Default::default())
/// });
/// policy.create(Template { id: 1 }, |t| async move { Ok(t) }).await?;
///
/// // The transaction committed.
/// scope.complete().apply(caches.isolated_caches());
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
pub struct CacheScope {
    caches: IsolatedCaches,
    pending: Mutex<PendingInvalidation>,
}

impl fmt::Debug for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheScope")
            .field("caches", &self.caches)
            .field("pending", &self.pending.lock().targets.len())
            .finish()
    }
}

impl CacheScope {
    /// Creates a scope whose private caches measure expiration with `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        let caches = IsolatedCaches::new(move |kind| {
            let inner = ObjectCache::builder(clock.clone())
                .name(kind.name())
                .telemetry(CacheTelemetry::disabled())
                .build();
            Arc::new(DeepCloneAppCache::from(inner)) as Arc<dyn AppPolicyCache>
        });

        Self {
            caches,
            pending: Mutex::new(PendingInvalidation::default()),
        }
    }

    /// Returns the private cache of `kind`.
    #[must_use]
    pub fn cache(&self, kind: EntityKind) -> Arc<dyn AppPolicyCache> {
        self.caches.get_or_create(kind)
    }

    /// Records that `target` must be evicted from the shared caches on commit.
    pub fn defer(&self, target: Invalidation) {
        self.pending.lock().push(target);
    }

    /// Ends the unit of work and returns what the shared caches owe.
    ///
    /// Everything recorded so far is handed over once; a second call returns only what was recorded after
    /// the first.
    pub fn complete(&self) -> PendingInvalidation {
        let pending = std::mem::take(&mut *self.pending.lock());
        tracing::debug!(scope.pending = pending.targets.len(), "scope.completed");
        pending
    }
}

/// Wraps a policy so that it reads and writes the private caches of a [`CacheScope`].
pub struct ScopedRepositoryCachePolicy<E, P> {
    inner: P,
    scope: Arc<CacheScope>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, P: fmt::Debug> fmt::Debug for ScopedRepositoryCachePolicy<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRepositoryCachePolicy")
            .field("inner", &self.inner)
            .field("scope", &self.scope)
            .finish()
    }
}

impl<E: CachedEntity, P: RepositoryCachePolicy<E>> ScopedRepositoryCachePolicy<E, P> {
    /// Builds the wrapped policy over the private cache of `E::KIND`.
    #[must_use]
    pub fn new(scope: &Arc<CacheScope>, build: impl FnOnce(Arc<dyn AppPolicyCache>) -> P) -> Self {
        Self {
            inner: build(scope.cache(E::KIND)),
            scope: Arc::clone(scope),
            _entity: PhantomData,
        }
    }

    /// Returns the wrapped policy.
    #[must_use]
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn defer_entity(&self, before: &E::Id, after: Option<&E::Id>) {
        self.scope.defer(Invalidation::Key {
            kind: E::KIND,
            key: keys::entity_key(E::KIND, before),
        });
        if let Some(after) = after.filter(|after| *after != before) {
            self.scope.defer(Invalidation::Key {
                kind: E::KIND,
                key: keys::entity_key(E::KIND, after),
            });
        }
        self.scope.defer(Invalidation::Key {
            kind: E::KIND,
            key: keys::kind_prefix(E::KIND),
        });
    }
}

impl<E: CachedEntity, P: RepositoryCachePolicy<E>> RepositoryCachePolicy<E> for ScopedRepositoryCachePolicy<E, P> {
    fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<Option<E>>> + Send {
        self.inner.get(id, store)
    }

    fn get_cached(&self, id: &E::Id) -> Option<E> {
        self.inner.get_cached(id)
    }

    fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<bool>> + Send {
        self.inner.exists(id, store)
    }

    async fn create<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        let before = entity.id();
        let result = self.inner.create(entity, persist).await;
        self.defer_entity(&before, result.as_ref().ok().map(|saved| saved.id()).as_ref());
        result
    }

    async fn update<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        let before = entity.id();
        let result = self.inner.update(entity, persist).await;
        self.defer_entity(&before, result.as_ref().ok().map(|saved| saved.id()).as_ref());
        result
    }

    async fn delete<F, Fut>(&self, entity: E, persist: F) -> Result<()>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let id = entity.id();
        let result = self.inner.delete(entity, persist).await;
        self.defer_entity(&id, None);
        result
    }

    fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> impl Future<Output = Result<Vec<E>>> + Send {
        self.inner.get_all(ids, store)
    }

    fn clear_all(&self) {
        self.inner.clear_all();
        self.scope.defer(Invalidation::Kind(E::KIND));
    }
}
