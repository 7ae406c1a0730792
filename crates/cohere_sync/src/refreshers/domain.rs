// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCaches, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clear_kind;
use crate::refresher::{CacheRefresher, PayloadCacheRefresher};

/// How a domain changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainChangeType {
    /// Every domain changed.
    RefreshAll,
    /// The domain was created or updated.
    Refresh,
    /// The domain was removed.
    Remove,
}

/// Describes a change to one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPayload {
    /// The id of the changed domain.
    pub id: i32,
    /// How the domain changed.
    pub change_type: DomainChangeType,
}

/// Evicts cached domains. Domains are cached as one collection, so any change drops the whole set.
#[derive(Debug, Clone)]
pub struct DomainCacheRefresher {
    caches: AppCaches,
}

impl DomainCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for DomainCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x1129_0a79_4b57_4c99_ad72_7748_a3cf_38af);
    const NAME: &'static str = "Domain cache refresher";
    const KIND: EntityKind = EntityKind::Domain;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::Domain);
    }
}

impl PayloadCacheRefresher for DomainCacheRefresher {
    type Payload = DomainPayload;

    fn refresh_payloads(&self, payloads: &[DomainPayload]) {
        if !payloads.is_empty() {
            clear_kind(&self.caches, EntityKind::Domain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refreshers::fixtures::*;

    #[test]
    fn any_change_drops_the_domain_set() {
        let caches = caches();
        seed_collection(&caches, EntityKind::Domain);
        seed(&caches, EntityKind::Language, 1);

        DomainCacheRefresher::new(caches.clone()).refresh_payloads(&[DomainPayload {
            id: 3,
            change_type: DomainChangeType::Remove,
        }]);

        assert_eq!(count(&caches, EntityKind::Domain), 0);
        assert_eq!(count(&caches, EntityKind::Language), 1);
    }
}
