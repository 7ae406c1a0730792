// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::sync::Arc;

use cohere_cache::{AppPolicyCache, Result};

use crate::{CachedEntity, DefaultRepositoryCachePolicy, EntityStore, RepositoryCachePolicy, RepositoryCachePolicyOptions};

/// A per-entity policy that never caches the result of a bulk read.
///
/// Single gets and writes behave like [`DefaultRepositoryCachePolicy`]. Bulk reads still try the entities
/// that happen to be cached, but whatever they load from the store is handed back without being stored,
/// because bulk results of this kind are too large or too volatile to be worth keeping.
#[derive(Debug)]
pub struct SingleItemsOnlyRepositoryCachePolicy<E> {
    inner: DefaultRepositoryCachePolicy<E>,
}

impl<E: CachedEntity> SingleItemsOnlyRepositoryCachePolicy<E> {
    /// Creates a policy caching into `cache`, usually the isolated cache of `E::KIND`.
    #[must_use]
    pub fn new(cache: Arc<dyn AppPolicyCache>, options: RepositoryCachePolicyOptions) -> Self {
        Self {
            inner: DefaultRepositoryCachePolicy::new(cache, options).without_get_all_caching(),
        }
    }

    /// Returns the cache this policy writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn AppPolicyCache> {
        self.inner.cache()
    }
}

impl<E: CachedEntity> RepositoryCachePolicy<E> for SingleItemsOnlyRepositoryCachePolicy<E> {
    fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<Option<E>>> + Send {
        self.inner.get(id, store)
    }

    fn get_cached(&self, id: &E::Id) -> Option<E> {
        self.inner.get_cached(id)
    }

    fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<bool>> + Send {
        self.inner.exists(id, store)
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

    fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> impl Future<Output = Result<Vec<E>>> + Send {
        self.inner.get_all(ids, store)
    }

    fn clear_all(&self) {
        self.inner.clear_all();
    }
}
