// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCaches, EntityKind};
use uuid::Uuid;

use super::{clear_kind, evict_entity};
use crate::refresher::{CacheRefresher, IdCacheRefresher};

/// Evicts cached back-office users.
#[derive(Debug, Clone)]
pub struct UserCacheRefresher {
    caches: AppCaches,
}

impl UserCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for UserCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0xe057_af6d_2ee6_41f4_8045_3694_010f_0aa6);
    const NAME: &'static str = "User cache refresher";
    const KIND: EntityKind = EntityKind::User;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::User);
    }
}

impl IdCacheRefresher for UserCacheRefresher {
    fn refresh_id(&self, id: i32) {
        evict_entity(&self.caches, EntityKind::User, id);
    }
}
