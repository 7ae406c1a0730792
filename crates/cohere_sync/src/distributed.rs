// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed dispatch: apply a refresh locally, then queue it for every peer.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use cohere_cache::{EntityKind, Result};
use uuid::Uuid;

use crate::messenger::ServerMessenger;
use crate::refresher::{CacheRefresher, IdCacheRefresher, KeyCacheRefresher, PayloadCacheRefresher};
use crate::registry::{CacheRefresherRegistry, MessageShape};
use crate::version::CacheVersionService;

/// A refresh addressed to a refresher by its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    /// Evict everything the refresher is responsible for.
    All,
    /// Evict the entities with these ids.
    Ids(Vec<i32>),
    /// Evict the removed entities with these ids.
    RemoveIds(Vec<i32>),
    /// Evict the entities with these secondary keys.
    Keys(Vec<Uuid>),
    /// Apply `count` change descriptions serialized as the JSON array `json`.
    Json {
        /// The serialized change descriptions.
        json: String,
        /// The number of change descriptions.
        count: usize,
    },
}

impl RefreshRequest {
    /// Returns the message shape the refresher must accept for this request.
    #[must_use]
    pub const fn shape(&self) -> MessageShape {
        match self {
            Self::All => MessageShape::RefreshAll,
            Self::Ids(_) | Self::RemoveIds(_) => MessageShape::ById,
            Self::Keys(_) => MessageShape::ByKey,
            Self::Json { .. } => MessageShape::ByPayload,
        }
    }

    /// Drops duplicates and default values, or returns `None` if nothing is left to refresh.
    fn normalize(self) -> Option<Self> {
        let normalized = match self {
            Self::All => Self::All,
            Self::Ids(ids) => Self::Ids(distinct(ids, |id| *id != 0)),
            Self::RemoveIds(ids) => Self::RemoveIds(distinct(ids, |id| *id != 0)),
            Self::Keys(keys) => Self::Keys(distinct(keys, |key| !key.is_nil())),
            Self::Json { json, count } => {
                if count == 0 || json.trim().is_empty() {
                    return None;
                }
                Self::Json { json, count }
            }
        };

        match &normalized {
            Self::Ids(ids) | Self::RemoveIds(ids) if ids.is_empty() => None,
            Self::Keys(keys) if keys.is_empty() => None,
            _ => Some(normalized),
        }
    }
}

fn distinct<T: Copy + Eq + Hash>(values: Vec<T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut seen = HashSet::with_capacity(values.len());
    values.into_iter().filter(|value| keep(value) && seen.insert(*value)).collect()
}

/// Applies refreshes to the local caches and queues them for peer servers.
///
/// The local caches are updated before any call returns; peers apply the refresh when their messenger
/// delivers it. With a version service attached, every applied refresh also stamps a new version for the
/// refresher's kind, so a peer that never receives the message still notices the drift. Unknown refreshers
/// and unsupported message shapes are configuration errors. Requests that are empty once duplicates and
/// default values are dropped do nothing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cohere_cache::AppCaches;
/// use cohere_sync::refreshers::UserCacheRefresher;
/// use cohere_sync::{CacheRefresherRegistry, DistributedCache, LocalOnlyMessenger, RefresherEntry};
///
/// # futures::executor::block_on(async {
/// let caches = AppCaches::disabled();
/// let registry = CacheRefresherRegistry::builder()
///     .register(RefresherEntry::new(UserCacheRefresher::new(caches)).by_id())
///     .build()?;
/// let distributed = DistributedCache::new(Arc::new(registry), Arc::new(LocalOnlyMessenger));
///
/// distributed.refresh_ids::<UserCacheRefresher>(&[7, 7, 0]).await?;
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct DistributedCache {
    registry: Arc<CacheRefresherRegistry>,
    messenger: Arc<dyn ServerMessenger>,
    versions: Option<Arc<dyn CacheVersionService>>,
}

impl DistributedCache {
    /// Creates a dispatcher applying refreshes through `registry` and queuing them with `messenger`.
    #[must_use]
    pub fn new(registry: Arc<CacheRefresherRegistry>, messenger: Arc<dyn ServerMessenger>) -> Self {
        Self {
            registry,
            messenger,
            versions: None,
        }
    }

    /// Stamps a new version of the refresher's kind through `versions` after every applied refresh.
    #[must_use]
    pub fn with_versions(mut self, versions: Arc<dyn CacheVersionService>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Returns the refresher registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CacheRefresherRegistry> {
        &self.registry
    }

    /// Returns the messenger.
    #[must_use]
    pub fn messenger(&self) -> &Arc<dyn ServerMessenger> {
        &self.messenger
    }

    /// Applies `request` through the refresher `refresher_id`, then queues it for peers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown or does not accept the request's shape, a
    /// serialization error if a JSON request cannot be parsed, the messenger's error if queuing fails and
    /// the version service's error if stamping fails. The local caches are already updated, and the version
    /// stamped, when queuing fails.
    pub async fn dispatch(&self, refresher_id: Uuid, request: RefreshRequest) -> Result<()> {
        let entry = self.registry.entry(refresher_id)?;
        let kind = entry.kind();
        let shape = request.shape();
        if !entry.supports(shape) {
            return Err(entry.unsupported(shape));
        }

        let Some(request) = request.normalize() else {
            tracing::debug!(refresher.id = %refresher_id, refresher.name = entry.name(), "refresher.skipped");
            return Ok(());
        };

        let queued = match request {
            RefreshRequest::All => {
                self.registry.refresh_all(refresher_id)?;
                self.messenger.queue_refresh_all(refresher_id).await
            }
            RefreshRequest::Ids(ids) => {
                for id in &ids {
                    self.registry.refresh_id(refresher_id, *id)?;
                }
                self.messenger.queue_refresh_ids(refresher_id, &ids).await
            }
            RefreshRequest::RemoveIds(ids) => {
                for id in &ids {
                    self.registry.remove_id(refresher_id, *id)?;
                }
                self.messenger.queue_remove_ids(refresher_id, &ids).await
            }
            RefreshRequest::Keys(keys) => {
                for key in &keys {
                    self.registry.refresh_key(refresher_id, *key)?;
                }
                self.messenger.queue_refresh_keys(refresher_id, &keys).await
            }
            RefreshRequest::Json { json, count } => {
                self.registry.refresh_json(refresher_id, &json)?;
                self.messenger.queue_refresh_json(refresher_id, json, count).await
            }
        };

        self.stamp(kind, queued).await
    }

    async fn stamp(&self, kind: EntityKind, queued: Result<()>) -> Result<()> {
        let Some(versions) = &self.versions else {
            return queued;
        };

        // A lost message is exactly what the stamp is for, so stamp even when queuing failed.
        let stamped = versions.set_cache_updated(kind).await;
        queued?;
        stamped
    }

    /// Evicts everything `R` is responsible for, on every server.
    ///
    /// # Errors
    ///
    /// See [`DistributedCache::dispatch`].
    pub async fn refresh_all<R: CacheRefresher>(&self) -> Result<()> {
        self.dispatch(R::UNIQUE_ID, RefreshRequest::All).await
    }

    /// Evicts the entities `ids` through `R`, on every server.
    ///
    /// # Errors
    ///
    /// See [`DistributedCache::dispatch`].
    pub async fn refresh_ids<R: IdCacheRefresher>(&self, ids: &[i32]) -> Result<()> {
        self.dispatch(R::UNIQUE_ID, RefreshRequest::Ids(ids.to_vec())).await
    }

    /// Evicts the removed entities `ids` through `R`, on every server.
    ///
    /// # Errors
    ///
    /// See [`DistributedCache::dispatch`].
    pub async fn remove_ids<R: IdCacheRefresher>(&self, ids: &[i32]) -> Result<()> {
        self.dispatch(R::UNIQUE_ID, RefreshRequest::RemoveIds(ids.to_vec())).await
    }

    /// Evicts the entities with secondary keys `keys` through `R`, on every server.
    ///
    /// # Errors
    ///
    /// See [`DistributedCache::dispatch`].
    pub async fn refresh_keys<R: KeyCacheRefresher>(&self, keys: &[Uuid]) -> Result<()> {
        self.dispatch(R::UNIQUE_ID, RefreshRequest::Keys(keys.to_vec())).await
    }

    /// Applies `payloads` through `R` locally without a serialization round trip, then queues their JSON
    /// form for peers.
    ///
    /// # Errors
    ///
    /// See [`DistributedCache::dispatch`].
    pub async fn refresh_payloads<R: PayloadCacheRefresher>(&self, payloads: &[R::Payload]) -> Result<()> {
        if payloads.is_empty() {
            let entry = self.registry.entry(R::UNIQUE_ID)?;
            if !entry.supports(MessageShape::ByPayload) {
                return Err(entry.unsupported(MessageShape::ByPayload));
            }
            return Ok(());
        }

        let json = self.registry.refresh_payloads::<R>(payloads)?;
        let queued = self.messenger.queue_refresh_json(R::UNIQUE_ID, json, payloads.len()).await;
        self.stamp(R::KIND, queued).await
    }
}
