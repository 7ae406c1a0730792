// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The whole-collection policy.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use cohere_cache::{AppCache, AppCacheExt, AppPolicyCache, AppPolicyCacheExt, EntryPolicy, Result, keys};

use crate::guard::EvictOnDrop;
use crate::{CachedEntity, EntityList, EntityStore, FullDataSetOptions, RepositoryCachePolicy};

/// Caches the entire collection of a kind as one unit.
///
/// Meant for small kinds that are always read whole, such as languages, domains and templates. The set lives
/// under the bare kind prefix and is loaded once. Every lookup by id, single or many, is answered from the set;
/// every write clears it. An empty collection is cached like any other.
pub struct FullDataSetRepositoryCachePolicy<E> {
    cache: Arc<dyn AppPolicyCache>,
    options: FullDataSetOptions,
    entry_policy: EntryPolicy,
    _entity: PhantomData<fn() -> E>,
}

impl<E> fmt::Debug for FullDataSetRepositoryCachePolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullDataSetRepositoryCachePolicy")
            .field("cache", &self.cache.name())
            .field("options", &self.options)
            .finish()
    }
}

impl<E: CachedEntity> FullDataSetRepositoryCachePolicy<E> {
    /// Creates a policy caching into `cache`, usually the isolated cache of `E::KIND`.
    #[must_use]
    pub fn new(cache: Arc<dyn AppPolicyCache>, options: FullDataSetOptions) -> Self {
        Self {
            entry_policy: options.entry_policy(),
            cache,
            options,
            _entity: PhantomData,
        }
    }

    /// Returns the cache this policy writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn AppPolicyCache> {
        &self.cache
    }

    fn key() -> String {
        keys::kind_prefix(E::KIND)
    }

    async fn all<S: EntityStore<E>>(&self, store: &S) -> Result<Option<Arc<EntityList<E>>>> {
        let key = Self::key();
        self.cache
            .get_or_insert_with_policy_as(&key, &self.entry_policy, || async move {
                store.load_many(&[]).await.map(|entities| Some(EntityList::new(entities)))
            })
            .await
    }

    async fn guarded<T, Fut>(&self, persist: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        let _evict = EvictOnDrop::new(self.cache.as_ref(), vec![Self::key()]);
        persist.await
    }
}

impl<E: CachedEntity> RepositoryCachePolicy<E> for FullDataSetRepositoryCachePolicy<E> {
    async fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<Option<E>> {
        Ok(self.all(store).await?.and_then(|all| all.find(id)))
    }

    fn get_cached(&self, id: &E::Id) -> Option<E> {
        self.cache.get_as::<EntityList<E>>(&Self::key())?.find(id)
    }

    async fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<bool> {
        Ok(self.get(id, store).await?.is_some())
    }

    async fn create<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.guarded(persist(entity)).await
    }

    async fn update<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.guarded(persist(entity)).await
    }

    async fn delete<F, Fut>(&self, entity: E, persist: F) -> Result<()>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        self.guarded(persist(entity)).await
    }

    async fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> Result<Vec<E>> {
        let Some(all) = self.all(store).await? else {
            return Ok(Vec::new());
        };

        if ids.is_empty() {
            return Ok(all.to_vec());
        }

        // Requested order, absent ids skipped.
        Ok(ids.iter().filter_map(|id| all.find(id)).collect())
    }

    fn clear_all(&self) {
        self.cache.clear_key(&Self::key());
    }
}
