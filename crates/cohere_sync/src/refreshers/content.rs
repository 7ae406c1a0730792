// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bitflags::bitflags;
use cohere_cache::{AppCache, AppCaches, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clear_kind, evict_entity, evict_entity_by_key};
use crate::refresher::{CacheRefresher, PayloadCacheRefresher};

bitflags! {
    /// What changed in a tree of entities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TreeChangeTypes: u8 {
        /// Everything changed.
        const REFRESH_ALL = 0b0001;
        /// The node itself changed.
        const REFRESH_NODE = 0b0010;
        /// The node and its whole subtree changed.
        const REFRESH_BRANCH = 0b0100;
        /// The node and its subtree were removed.
        const REMOVE = 0b1000;
    }
}

flags_as_bits!(TreeChangeTypes: u8);

/// Describes a change to one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    /// The id of the changed item.
    pub id: i32,
    /// The secondary key of the changed item, if known.
    #[serde(default)]
    pub key: Option<Uuid>,
    /// What changed.
    pub change_types: TreeChangeTypes,
}

impl ContentPayload {
    /// Describes a change to item `id`.
    #[must_use]
    pub fn new(id: i32, change_types: TreeChangeTypes) -> Self {
        Self {
            id,
            key: None,
            change_types,
        }
    }

    /// Adds the secondary key of the item.
    #[must_use]
    pub fn with_key(mut self, key: Uuid) -> Self {
        self.key = Some(key);
        self
    }
}

/// Evicts cached content items.
///
/// Branch refreshes and removals evict every cached item whose tree path runs through the changed node.
#[derive(Debug, Clone)]
pub struct ContentCacheRefresher {
    caches: AppCaches,
}

impl ContentCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }

    fn evict_branch(&self, id: i32) {
        let Some(cache) = self.caches.isolated_caches().try_get(EntityKind::Content) else {
            return;
        };

        let segment = id.to_string();
        cache.clear_of_kind_where(EntityKind::Content, &|_, value| {
            value
                .tree_path()
                .is_some_and(|path| path.split(',').any(|ancestor| ancestor == segment))
        });
    }
}

impl CacheRefresher for ContentCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x900a_4fbe_df3c_41e6_bb77_be89_6cd1_58ea);
    const NAME: &'static str = "Content cache refresher";
    const KIND: EntityKind = EntityKind::Content;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::Content);
    }
}

impl PayloadCacheRefresher for ContentCacheRefresher {
    type Payload = ContentPayload;

    fn refresh_payloads(&self, payloads: &[ContentPayload]) {
        if payloads.iter().any(|p| p.change_types.contains(TreeChangeTypes::REFRESH_ALL)) {
            self.refresh_all();
            return;
        }

        for payload in payloads {
            if payload.change_types.intersects(TreeChangeTypes::REFRESH_NODE | TreeChangeTypes::REMOVE) {
                evict_entity(&self.caches, EntityKind::Content, payload.id);
                if let Some(key) = payload.key {
                    evict_entity_by_key(&self.caches, EntityKind::Content, key);
                }
            }

            if payload.change_types.intersects(TreeChangeTypes::REFRESH_BRANCH | TreeChangeTypes::REMOVE) {
                self.evict_branch(payload.id);
            }
        }
    }
}
