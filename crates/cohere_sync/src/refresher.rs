// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The refresher contract.
//!
//! A refresher knows how to evict the cached entries of one entity kind when told that something changed.
//! Every refresher supports a full refresh. The message shapes it accepts beyond that are declared by
//! implementing the matching capability trait, so that a dispatch helper asking for an unsupported shape
//! does not compile.

use std::fmt::Debug;

use cohere_cache::EntityKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Evicts the cached entries of one entity kind.
///
/// Every transition is synchronous and idempotent: applying the same message twice leaves the caches in the
/// same state as applying it once.
pub trait CacheRefresher: Send + Sync + Debug + 'static {
    /// Stable identifier used as the wire-level address of this refresher.
    const UNIQUE_ID: Uuid;

    /// Human-readable name used in logs and notifications.
    const NAME: &'static str;

    /// The entity kind this refresher is bound to.
    const KIND: EntityKind;

    /// Evicts every entry of the kind and of the caches derived from it.
    fn refresh_all(&self);
}

/// A refresher that accepts messages addressed by numeric id.
pub trait IdCacheRefresher: CacheRefresher {
    /// Evicts the entity with `id` and cascades to dependent kinds.
    fn refresh_id(&self, id: i32);

    /// Evicts the removed entity with `id` and cascades to dependent kinds.
    fn remove_id(&self, id: i32) {
        self.refresh_id(id);
    }
}

/// A refresher that accepts messages addressed by secondary key.
pub trait KeyCacheRefresher: CacheRefresher {
    /// Evicts the entity with `key` and cascades to dependent kinds.
    fn refresh_key(&self, key: Uuid);
}

/// A refresher that accepts structured change descriptions.
pub trait PayloadCacheRefresher: CacheRefresher {
    /// One element of a change description.
    type Payload: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;

    /// Evicts what every element of `payloads` describes.
    fn refresh_payloads(&self, payloads: &[Self::Payload]);
}
