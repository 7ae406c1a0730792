// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCache, AppCaches, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clear_kind, evict_entity, evict_entity_by_key};
use crate::refresher::{CacheRefresher, PayloadCacheRefresher};

/// Describes a change to one data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTypePayload {
    /// The id of the changed data type.
    pub id: i32,
    /// The secondary key of the changed data type.
    pub key: Uuid,
    /// Whether the data type was removed.
    #[serde(default)]
    pub removed: bool,
}

/// Evicts cached data types and the content, media and member types whose properties use them.
#[derive(Debug, Clone)]
pub struct DataTypeCacheRefresher {
    caches: AppCaches,
}

impl DataTypeCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }

    fn evict_compositions(&self) {
        for kind in [EntityKind::ContentType, EntityKind::MediaType, EntityKind::MemberType] {
            self.caches.isolated_caches().clear(kind);
        }
        self.caches.runtime_cache().clear_of_kind(EntityKind::ContentTypeComposition);
    }
}

impl CacheRefresher for DataTypeCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x35b1_6c25_a17e_45d7_bc8f_edab_1dcc_28d2);
    const NAME: &'static str = "Data type cache refresher";
    const KIND: EntityKind = EntityKind::DataType;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::DataType);
        self.evict_compositions();
    }
}

impl PayloadCacheRefresher for DataTypeCacheRefresher {
    type Payload = DataTypePayload;

    fn refresh_payloads(&self, payloads: &[DataTypePayload]) {
        if payloads.is_empty() {
            return;
        }

        for payload in payloads {
            evict_entity(&self.caches, EntityKind::DataType, payload.id);
            evict_entity_by_key(&self.caches, EntityKind::DataType, payload.key);
        }

        self.evict_compositions();
    }
}
