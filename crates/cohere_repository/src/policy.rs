// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;

use cohere_cache::Result;

use crate::{CachedEntity, EntityStore};

/// A strategy a repository consults for every read and write of one entity kind.
///
/// Write operations receive the entity by value together with a persist action. The action runs first; the
/// policy only touches the cache once it knows whether the store accepted the write. Create and update
/// actions hand back the persisted entity, which may carry an identity the store assigned.
pub trait RepositoryCachePolicy<E: CachedEntity>: Send + Sync {
    /// Returns the entity with identifier `id`, reading through `store` on a miss.
    fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<Option<E>>> + Send;

    /// Returns the entity with identifier `id` if it is cached. Never touches the store.
    fn get_cached(&self, id: &E::Id) -> Option<E>;

    /// Returns `true` if the entity with identifier `id` exists.
    fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> impl Future<Output = Result<bool>> + Send;

    /// Persists a new entity with `persist` and caches the result.
    fn create<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<E>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send;

    /// Persists a changed entity with `persist` and caches the result.
    fn update<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<E>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send;

    /// Deletes an entity with `persist` and evicts it.
    fn delete<F, Fut>(&self, entity: E, persist: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send;

    /// Returns the entities with the given identifiers, or every entity when `ids` is empty.
    fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> impl Future<Output = Result<Vec<E>>> + Send;

    /// Evicts everything this policy cached.
    fn clear_all(&self);
}
