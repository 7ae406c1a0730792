// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use cohere_cache::Result;

use crate::{CachedEntity, EntityStore, RepositoryCachePolicy};

/// A policy that caches nothing and sends every operation to the store.
pub struct NoCacheRepositoryCachePolicy<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> fmt::Debug for NoCacheRepositoryCachePolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoCacheRepositoryCachePolicy").finish()
    }
}

impl<E> Default for NoCacheRepositoryCachePolicy<E> {
    fn default() -> Self {
        Self { _entity: PhantomData }
    }
}

impl<E: CachedEntity> NoCacheRepositoryCachePolicy<E> {
    /// Creates the policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: CachedEntity> RepositoryCachePolicy<E> for NoCacheRepositoryCachePolicy<E> {
    async fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<Option<E>> {
        store.load_one(id).await
    }

    fn get_cached(&self, _id: &E::Id) -> Option<E> {
        None
    }

    async fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<bool> {
        store.exists(id).await
    }

    async fn create<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        persist(entity).await
    }

    async fn update<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        persist(entity).await
    }

    async fn delete<F, Fut>(&self, entity: E, persist: F) -> Result<()>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        persist(entity).await
    }

    async fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> Result<Vec<E>> {
        store.load_many(ids).await
    }

    fn clear_all(&self) {}
}
