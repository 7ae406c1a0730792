// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bitflags::bitflags;
use cohere_cache::{AppCache, AppCaches, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clear_kind, evict_entity};
use crate::refresher::{CacheRefresher, PayloadCacheRefresher};

bitflags! {
    /// What changed in a content, media or member type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentTypeChangeTypes: u8 {
        /// The type was created.
        const CREATE = 0b0001;
        /// The structure of the type changed, affecting the items built from it.
        const REFRESH_MAIN = 0b0010;
        /// Something that does not affect items changed, such as the name.
        const REFRESH_OTHER = 0b0100;
        /// The type was removed.
        const REMOVE = 0b1000;
    }
}

flags_as_bits!(ContentTypeChangeTypes: u8);

/// Describes a change to one content, media or member type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypePayload {
    /// Which family of types changed: [`EntityKind::ContentType`], [`EntityKind::MediaType`] or
    /// [`EntityKind::MemberType`].
    pub item_type: EntityKind,
    /// The id of the changed type.
    pub id: i32,
    /// What changed.
    pub change_types: ContentTypeChangeTypes,
}

/// Evicts cached content, media and member types, and the items built from them.
#[derive(Debug, Clone)]
pub struct ContentTypeCacheRefresher {
    caches: AppCaches,
}

const TYPE_KINDS: [EntityKind; 3] = [EntityKind::ContentType, EntityKind::MediaType, EntityKind::MemberType];

/// Returns the kind of the items built from types of `item_type`.
const fn items_of(item_type: EntityKind) -> Option<EntityKind> {
    match item_type {
        EntityKind::ContentType => Some(EntityKind::Content),
        EntityKind::MediaType => Some(EntityKind::Media),
        EntityKind::MemberType => Some(EntityKind::Member),
        _ => None,
    }
}

impl ContentTypeCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for ContentTypeCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x6902_e22c_9c10_483c_91f3_66b7_cae9_e2f5);
    const NAME: &'static str = "Content type cache refresher";
    const KIND: EntityKind = EntityKind::ContentType;

    fn refresh_all(&self) {
        for kind in TYPE_KINDS {
            clear_kind(&self.caches, kind);
            if let Some(items) = items_of(kind) {
                clear_kind(&self.caches, items);
            }
        }
        self.caches.runtime_cache().clear_of_kind(EntityKind::ContentTypeComposition);
    }
}

impl PayloadCacheRefresher for ContentTypeCacheRefresher {
    type Payload = ContentTypePayload;

    fn refresh_payloads(&self, payloads: &[ContentTypePayload]) {
        for payload in payloads {
            let Some(items) = items_of(payload.item_type) else {
                tracing::warn!(
                    refresher.name = Self::NAME,
                    refresher.kind = payload.item_type.name(),
                    "refresher.unexpected_item_type"
                );
                continue;
            };

            evict_entity(&self.caches, payload.item_type, payload.id);

            // A freshly created type has no items yet.
            if payload.change_types != ContentTypeChangeTypes::CREATE {
                clear_kind(&self.caches, items);
            }
        }

        self.caches.runtime_cache().clear_of_kind(EntityKind::ContentTypeComposition);
    }
}
