// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCaches, EntityKind};
use uuid::Uuid;

use super::clear_kind;
use crate::refresher::CacheRefresher;

/// Evicts cached public access rules. Only full refreshes are accepted.
#[derive(Debug, Clone)]
pub struct PublicAccessCacheRefresher {
    caches: AppCaches,
}

impl PublicAccessCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for PublicAccessCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x1db0_8769_b104_4f8b_850e_169c_ac1d_f2ec);
    const NAME: &'static str = "Public access cache refresher";
    const KIND: EntityKind = EntityKind::PublicAccessEntry;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::PublicAccessEntry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refreshers::fixtures::*;

    #[test]
    fn refresh_all_drops_rules() {
        let caches = caches();
        seed_collection(&caches, EntityKind::PublicAccessEntry);

        PublicAccessCacheRefresher::new(caches.clone()).refresh_all();

        assert_eq!(count(&caches, EntityKind::PublicAccessEntry), 0);
    }
}
