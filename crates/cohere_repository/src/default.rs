// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The per-entity policy.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use cohere_cache::{AppCache, AppCacheExt, AppPolicyCache, AppPolicyCacheExt, EntryPolicy, Result, keys};

use crate::guard::EvictOnDrop;
use crate::{CachedEntity, CachedEntityValue, EntityList, EntityStore, RepositoryCachePolicy, RepositoryCachePolicyOptions};

/// Caches each entity under its own key.
///
/// Entities live under `uRepo_{Kind}_{id}` with the configured (by default sliding, five minute) expiration.
/// The bare kind prefix holds an empty-set marker when an "all" query found nothing and
/// [`RepositoryCachePolicyOptions::allow_zero_count`] is set.
///
/// Writes persist first. A successful create or update caches the persisted entity; a failed one evicts the
/// entity so the cache never claims a shape the store rejected. A delete evicts whatever the outcome.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::{AppPolicyCache, EntityKind, ObjectCache};
/// use cohere_repository::{CachedEntity, DefaultRepositoryCachePolicy, RepositoryCachePolicy};
/// use tick::Clock;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct User {
///     id: i32,
///     name: String,
/// }
///
/// impl CachedEntity for User {
///     const KIND: EntityKind = EntityKind::User;
///     type Id = i32;
///
///     fn id(&self) -> i32 {
///         self.id
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let cache: Arc<dyn AppPolicyCache> = Arc::new(ObjectCache::builder(Clock::new_frozen()).build());
/// let policy = DefaultRepositoryCachePolicy::<User>::new(cache, Default::default());
/// let user = User { id: 7, name: "ada".into() };
/// policy.create(user.clone(), |u| async move { Ok(u) }).await?;
///
/// assert_eq!(policy.get_cached(&7), Some(user));
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
pub struct DefaultRepositoryCachePolicy<E> {
    cache: Arc<dyn AppPolicyCache>,
    options: RepositoryCachePolicyOptions,
    entry_policy: EntryPolicy,
    cache_get_all: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> fmt::Debug for DefaultRepositoryCachePolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRepositoryCachePolicy")
            .field("cache", &self.cache.name())
            .field("options", &self.options)
            .field("cache_get_all", &self.cache_get_all)
            .finish()
    }
}

impl<E: CachedEntity> DefaultRepositoryCachePolicy<E> {
    /// Creates a policy caching into `cache`, usually the isolated cache of `E::KIND`.
    #[must_use]
    pub fn new(cache: Arc<dyn AppPolicyCache>, options: RepositoryCachePolicyOptions) -> Self {
        Self {
            entry_policy: options.entry_policy(),
            cache,
            options,
            cache_get_all: true,
            _entity: PhantomData,
        }
    }

    pub(crate) fn without_get_all_caching(mut self) -> Self {
        self.cache_get_all = false;
        self
    }

    /// Returns the cache this policy writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn AppPolicyCache> {
        &self.cache
    }

    /// Returns the options of this policy.
    #[must_use]
    pub fn options(&self) -> &RepositoryCachePolicyOptions {
        &self.options
    }

    fn key(id: &E::Id) -> String {
        keys::entity_key(E::KIND, id)
    }

    fn prefix() -> String {
        keys::kind_prefix(E::KIND)
    }

    async fn insert_entity(&self, entity: &E) {
        if !entity.has_identity() {
            return;
        }

        let key = Self::key(&entity.id());
        if let Err(error) = self
            .cache
            .insert_value(&key, CachedEntityValue::new(entity.clone()), &self.entry_policy)
            .await
        {
            tracing::warn!(cache.name = self.cache.name(), cache.key = %key, error = %error, "repository.insert_failed");
            self.cache.clear_key(&key);
        }
    }

    async fn insert_entities(&self, ids: &[E::Id], entities: &[E]) {
        if !self.cache_get_all {
            return;
        }

        if ids.is_empty() && entities.is_empty() && self.options.allow_zero_count {
            let prefix = Self::prefix();
            if let Err(error) = self
                .cache
                .insert_value(&prefix, EntityList::<E>::new(Vec::new()), &self.entry_policy)
                .await
            {
                tracing::warn!(cache.name = self.cache.name(), cache.key = %prefix, error = %error, "repository.insert_failed");
            }
        }

        for entity in entities {
            self.insert_entity(entity).await;
        }
    }

    fn cached_all(&self) -> Vec<E> {
        self.cache
            .search_by_key_as::<CachedEntityValue<E>>(&Self::prefix())
            .into_iter()
            .map(CachedEntityValue::take)
            .collect()
    }

    fn has_zero_count_marker(&self) -> bool {
        self.cache.get(&Self::prefix()).is_some_and(|marker| marker.is::<EntityList<E>>())
    }

    async fn write<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        let key = Self::key(&entity.id());
        let prefix = Self::prefix();

        match persist(entity).await {
            Ok(saved) => {
                self.insert_entity(&saved).await;
                self.cache.clear_key(&prefix);
                Ok(saved)
            }
            Err(error) => {
                self.cache.clear_key(&key);
                self.cache.clear_key(&prefix);
                Err(error)
            }
        }
    }
}

impl<E: CachedEntity> RepositoryCachePolicy<E> for DefaultRepositoryCachePolicy<E> {
    async fn get<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<Option<E>> {
        let key = Self::key(id);
        let found = self
            .cache
            .get_or_insert_with_policy_as(&key, &self.entry_policy, || async move {
                store
                    .load_one(id)
                    .await
                    .map(|loaded| loaded.filter(|entity| entity.has_identity()).map(CachedEntityValue::new))
            })
            .await?;

        Ok(found.map(CachedEntityValue::take))
    }

    fn get_cached(&self, id: &E::Id) -> Option<E> {
        self.cache
            .get_as::<CachedEntityValue<E>>(&Self::key(id))
            .map(CachedEntityValue::take)
    }

    async fn exists<S: EntityStore<E>>(&self, id: &E::Id, store: &S) -> Result<bool> {
        let cached = self
            .cache
            .get(&Self::key(id))
            .is_some_and(|value| value.is::<CachedEntityValue<E>>());
        if cached {
            return Ok(true);
        }

        store.exists(id).await
    }

    async fn create<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.write(entity, persist).await
    }

    async fn update<F, Fut>(&self, entity: E, persist: F) -> Result<E>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<E>> + Send,
    {
        self.write(entity, persist).await
    }

    async fn delete<F, Fut>(&self, entity: E, persist: F) -> Result<()>
    where
        F: FnOnce(E) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let _evict = EvictOnDrop::new(self.cache.as_ref(), vec![Self::key(&entity.id()), Self::prefix()]);
        persist(entity).await
    }

    async fn get_all<S: EntityStore<E>>(&self, ids: &[E::Id], store: &S) -> Result<Vec<E>> {
        if ids.is_empty() {
            let cached = self.cached_all();
            if cached.is_empty() {
                if self.has_zero_count_marker() {
                    return Ok(cached);
                }
            } else if !self.options.validate_count || cached.len() == store.count().await? {
                return Ok(cached);
            }
        } else {
            let cached: Option<Vec<E>> = ids.iter().map(|id| self.get_cached(id)).collect();
            if let Some(cached) = cached {
                return Ok(cached);
            }
        }

        let loaded = store.load_many(ids).await?;
        self.insert_entities(ids, &loaded).await;
        Ok(loaded)
    }

    fn clear_all(&self) {
        self.cache.clear_by_key(&Self::prefix());
    }
}
