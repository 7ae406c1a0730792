// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Version checks ahead of repository reads.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use cohere_cache::{EntityKind, Result};
use futures::future::BoxFuture;

use crate::{CachedEntity, EntityStore, RepositoryCachePolicy};

/// Brings the local caches of a kind up to date before they are read.
///
/// An implementation compares the kind's locally remembered version with the stored one and, on drift,
/// discards the kind's caches and adopts the stored version.
pub trait CacheSync: Send + Sync + Debug {
    /// Discards the local caches of `kind` if another server changed it since they were filled.
    ///
    /// # Errors
    ///
    /// Returns the error of the version check.
    fn ensure_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>>;
}

/// Wraps a policy so that every read going to the cache or the store is preceded by a version check.
///
/// Writes pass straight through; stamping the version after a write is left to whoever announces the
/// change to the other servers. [`RepositoryCachePolicy::get_cached`] stays a plain cache lookup.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::{AppCaches, EntityKind, Result};
/// use cohere_repository::{
///     CacheSync, CachedEntity, DefaultRepositoryCachePolicy, RepositoryCachePolicy, SyncedRepositoryCachePolicy,
/// };
/// use futures::future::{self, BoxFuture};
/// use tick::Clock;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Member {
///     id: i32,
/// }
///
/// impl CachedEntity for Member {
///     const KIND: EntityKind = EntityKind::Member;
///     type Id = i32;
///
///     fn id(&self) -> i32 {
///         self.id
///     }
/// }
///
/// #[derive(Debug)]
/// struct AlwaysCurrent;
///
/// impl CacheSync for AlwaysCurrent {
///     fn ensure_synced(&self, _kind: EntityKind) -> BoxFuture<'_, Result<()>> {
///         Box::pin(future::ready(Ok(())))
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let caches = AppCaches::builder(Clock::new_frozen()).build();
/// let policy = SyncedRepositoryCachePolicy::new(
///     DefaultRepositoryCachePolicy::<Member>::new(
///         caches.isolated_caches().get_or_create(EntityKind::Member),
///         Default::default(),
///     ),
///     Arc::new(AlwaysCurrent),
/// );
///
/// policy.create(Member { id: 1 }, |member| async move { Ok(member) }).await?;
/// assert_eq!(policy.get_cached(&1), Some(Member { id: 1 }));
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct SyncedRepositoryCachePolicy<P> {
    inner: P,
    sync: Arc<dyn CacheSync>,
}

impl<P> SyncedRepositoryCachePolicy<P> {
    /// Wraps `inner`, checking with `sync` before each read.
    #[must_use]
    pub fn new(inner: P, sync: Arc<dyn CacheSync>) -> Self {
        Self { inner, sync }
    }

    /// Returns the wrapped policy.
    #[must_use]
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<E, P> RepositoryCachePolicy<E> for SyncedRepositoryCachePolicy<P>
where
    E: CachedEntity,
    P: RepositoryCachePolicy<E>,
{
    async fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<Option<E>> {
        self.sync.ensure_synced(E::KIND).await?;
        self.inner.get(id, store).await
    }

    fn get_cached(&self, id: &E::Id) -> Option<E> {
        self.inner.get_cached(id)
    }

    async fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<bool> {
        self.sync.ensure_synced(E::KIND).await?;
        self.inner.exists(id, store).await
    }

    fn create<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<E>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.inner.create(entity, persist)
    }

    fn update<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<E>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.inner.update(entity, persist)
    }

    fn delete<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        self.inner.delete(entity, persist)
    }

    async fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> Result<Vec<E>> {
        self.sync.ensure_synced(E::KIND).await?;
        self.inner.get_all(ids, store).await
    }

    fn clear_all(&self) {
        self.inner.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use cohere_cache::{AppCaches, Error, ErrorKind};
    use futures::future;
    use parking_lot::Mutex;
    use tick::Clock;

    use super::*;
    use crate::testing::{MockStore, StoreOp};
    use crate::{DefaultRepositoryCachePolicy, RepositoryCachePolicyOptions};

    #[derive(Debug, Clone, PartialEq)]
    struct Member {
        id: i32,
        name: String,
    }

    impl CachedEntity for Member {
        const KIND: EntityKind = EntityKind::Member;
        type Id = i32;

        fn id(&self) -> i32 {
            self.id
        }
    }

    fn member(id: i32, name: &str) -> Member {
        Member {
            id,
            name: name.to_string(),
        }
    }

    /// Discards the member caches on the next check when told the kind drifted.
    #[derive(Debug)]
    struct Drift {
        caches: AppCaches,
        stale: Mutex<bool>,
        checks: Mutex<Vec<EntityKind>>,
        broken: bool,
    }

    impl Drift {
        fn new(caches: AppCaches) -> Self {
            Self {
                caches,
                stale: Mutex::new(false),
                checks: Mutex::new(Vec::new()),
                broken: false,
            }
        }
    }

    impl CacheSync for Drift {
        fn ensure_synced(&self, kind: EntityKind) -> BoxFuture<'_, Result<()>> {
            self.checks.lock().push(kind);
            if self.broken {
                return Box::pin(future::ready(Err(Error::version_store("version table missing"))));
            }
            if std::mem::take(&mut *self.stale.lock()) {
                self.caches.isolated_caches().clear(kind);
            }
            Box::pin(future::ready(Ok(())))
        }
    }

    fn setup(broken: bool) -> (Arc<Drift>, SyncedRepositoryCachePolicy<DefaultRepositoryCachePolicy<Member>>) {
        let caches = AppCaches::builder(Clock::new_frozen()).build();
        let inner = DefaultRepositoryCachePolicy::new(
            caches.isolated_caches().get_or_create(EntityKind::Member),
            RepositoryCachePolicyOptions::default(),
        );
        let drift = Arc::new(Drift {
            broken,
            ..Drift::new(caches)
        });
        let policy = SyncedRepositoryCachePolicy::new(inner, Arc::clone(&drift) as Arc<dyn CacheSync>);
        (drift, policy)
    }

    fn loads(store: &MockStore<Member>) -> usize {
        store.count_of(|op| matches!(op, StoreOp::LoadOne(_)))
    }

    #[test]
    fn reads_check_the_version_first() -> Result<()> {
        futures::executor::block_on(async {
            let (drift, policy) = setup(false);
            let store = MockStore::with_entities([member(1, "ann")]);

            policy.get(&1, &store).await?;
            policy.exists(&1, &store).await?;
            policy.get_all(&[1], &store).await?;
            assert_eq!(policy.get_cached(&1), Some(member(1, "ann")));

            assert_eq!(*drift.checks.lock(), vec![EntityKind::Member; 3]);
            Ok(())
        })
    }

    #[test]
    fn drift_discards_the_cache_before_reading() -> Result<()> {
        futures::executor::block_on(async {
            let (drift, policy) = setup(false);
            let store = MockStore::with_entities([member(1, "ann")]);

            policy.get(&1, &store).await?;
            policy.get(&1, &store).await?;
            assert_eq!(loads(&store), 1);

            *drift.stale.lock() = true;
            policy.get(&1, &store).await?;
            assert_eq!(loads(&store), 2);
            Ok(())
        })
    }

    #[test]
    fn writes_do_not_check() -> Result<()> {
        futures::executor::block_on(async {
            let (drift, policy) = setup(false);
            let store = MockStore::<Member>::new();

            policy.create(member(4, "bo"), |m| store.persist(m)).await?;
            assert!(drift.checks.lock().is_empty());
            assert_eq!(policy.inner().get_cached(&4), Some(member(4, "bo")));
            Ok(())
        })
    }

    #[test]
    fn failed_check_fails_the_read() {
        futures::executor::block_on(async {
            let (_, policy) = setup(true);
            let store = MockStore::with_entities([member(1, "ann")]);

            let error = policy.get(&1, &store).await.expect_err("check fails");

            assert_eq!(error.kind(), ErrorKind::VersionStore);
            assert_eq!(loads(&store), 0);
        });
    }
}
