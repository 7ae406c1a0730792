// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCaches, EntityKind};
use uuid::Uuid;

use super::{clear_kind, evict_entity};
use crate::refresher::{CacheRefresher, IdCacheRefresher};

/// Evicts cached templates.
///
/// Templates are cached as one collection, so any change drops the whole set. Content types list their
/// allowed templates and are evicted too.
#[derive(Debug, Clone)]
pub struct TemplateCacheRefresher {
    caches: AppCaches,
}

impl TemplateCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for TemplateCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0xdd12_b6a0_14b9_46e8_8800_c154_f740_47c8);
    const NAME: &'static str = "Template cache refresher";
    const KIND: EntityKind = EntityKind::Template;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::Template);
        clear_kind(&self.caches, EntityKind::ContentType);
    }
}

impl IdCacheRefresher for TemplateCacheRefresher {
    fn refresh_id(&self, id: i32) {
        evict_entity(&self.caches, EntityKind::Template, id);
        clear_kind(&self.caches, EntityKind::ContentType);
    }
}
