// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;

use cohere_cache::Result;

use crate::CachedEntity;

/// The storage collaborator a repository reads through.
///
/// The cache layer makes no assumption about how these operations are implemented. Writes are not part of
/// this trait; policies receive them as a persist action so that the caller controls the write itself.
pub trait EntityStore<E: CachedEntity>: Send + Sync {
    /// Loads one entity.
    fn load_one(&self, id: &E::Id) -> impl Future<Output = Result<Option<E>>> + Send;

    /// Loads the entities with the given identifiers, or every entity when `ids` is empty.
    fn load_many(&self, ids: &[E::Id]) -> impl Future<Output = Result<Vec<E>>> + Send;

    /// Returns `true` if an entity with identifier `id` exists.
    fn exists(&self, id: &E::Id) -> impl Future<Output = Result<bool>> + Send;

    /// Returns the number of stored entities.
    fn count(&self) -> impl Future<Output = Result<usize>> + Send;
}
