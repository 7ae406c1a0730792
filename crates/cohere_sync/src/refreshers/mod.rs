// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Built-in refreshers for the entity kinds of the platform.
//!
//! Each refresher owns a handle to the process caches and evicts by id, by secondary key, by kind or by tree
//! path. Cascades to dependent kinds clear the dependent isolated cache as a whole.

use cohere_cache::{AppCache, AppCaches, EntityKind, keys};
use uuid::Uuid;

/// Serializes a flags type as its raw bits, rejecting unknown bits on the way in.
macro_rules! flags_as_bits {
    ($flags:ident: $bits:ty) => {
        impl serde::Serialize for $flags {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.bits(), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $flags {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bits = <$bits as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_bits(bits).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid {} bits: {bits:#04x}", stringify!($flags)))
                })
            }
        }
    };
}

mod content;
mod content_type;
mod data_type;
mod domain;
mod language;
mod public_access;
mod template;
mod user;

pub use content::{ContentCacheRefresher, ContentPayload, TreeChangeTypes};
pub use content_type::{ContentTypeCacheRefresher, ContentTypeChangeTypes, ContentTypePayload};
pub use data_type::{DataTypeCacheRefresher, DataTypePayload};
pub use domain::{DomainCacheRefresher, DomainChangeType, DomainPayload};
pub use language::{LanguageCacheRefresher, LanguageChangeType, LanguagePayload};
pub use public_access::PublicAccessCacheRefresher;
pub use template::TemplateCacheRefresher;
pub use user::UserCacheRefresher;

/// Evicts entity `id` of `kind` along with the kind's collection key.
fn evict_entity(caches: &AppCaches, kind: EntityKind, id: i32) {
    if let Some(cache) = caches.isolated_caches().try_get(kind) {
        cache.clear_key(&keys::entity_key(kind, id));
        cache.clear_key(&keys::kind_prefix(kind));
    }
}

/// Evicts the entity of `kind` addressed by secondary key `key`.
fn evict_entity_by_key(caches: &AppCaches, kind: EntityKind, key: Uuid) {
    if key.is_nil() {
        return;
    }

    if let Some(cache) = caches.isolated_caches().try_get(kind) {
        cache.clear_key(&keys::entity_key_by_uuid(kind, key));
    }
}

/// Evicts every cached value of `kind`, in its isolated cache and in the runtime cache.
fn clear_kind(caches: &AppCaches, kind: EntityKind) {
    caches.isolated_caches().clear(kind);
    caches.runtime_cache().clear_of_kind(kind);
}

#[cfg(test)]
pub(crate) mod fixtures {
    use cohere_cache::{AppCacheExt, AppPolicyCacheExt, CacheTelemetry, CacheValue, EntryPolicy};
    use futures::executor::block_on;
    use tick::Clock;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Node {
        kind: EntityKind,
        path: String,
    }

    impl Node {
        pub(crate) fn of(kind: EntityKind) -> Self {
            Self {
                kind,
                path: String::from("-1"),
            }
        }
    }

    impl CacheValue for Node {
        fn entity_kind(&self) -> Option<EntityKind> {
            Some(self.kind)
        }

        fn tree_path(&self) -> Option<&str> {
            Some(&self.path)
        }

        fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
            Some(Box::new(self.clone()))
        }
    }

    pub(crate) fn caches() -> AppCaches {
        AppCaches::builder(Clock::new_frozen()).telemetry(CacheTelemetry::disabled()).build()
    }

    pub(crate) fn seed_at(caches: &AppCaches, kind: EntityKind, key: &str, path: &str) {
        let node = Node {
            path: path.to_owned(),
            ..Node::of(kind)
        };
        block_on(caches.isolated_caches().get_or_create(kind).insert_value(key, node, &EntryPolicy::none()))
            .expect("seed");
    }

    pub(crate) fn seed(caches: &AppCaches, kind: EntityKind, id: i32) {
        seed_at(caches, kind, &keys::entity_key(kind, id), &format!("-1,{id}"));
    }

    pub(crate) fn seed_collection(caches: &AppCaches, kind: EntityKind) {
        seed_at(caches, kind, &keys::kind_prefix(kind), "-1");
    }

    pub(crate) fn is_cached(caches: &AppCaches, kind: EntityKind, key: &str) -> bool {
        caches.isolated_caches().get_or_create(kind).get_as::<Node>(key).is_some()
    }

    pub(crate) fn is_entity_cached(caches: &AppCaches, kind: EntityKind, id: i32) -> bool {
        is_cached(caches, kind, &keys::entity_key(kind, id))
    }

    pub(crate) fn count(caches: &AppCaches, kind: EntityKind) -> usize {
        caches
            .isolated_caches()
            .get_or_create(kind)
            .search_by_key_as::<Node>(keys::REPOSITORY_PREFIX)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn evict_entity_also_drops_the_collection_key() {
        let caches = caches();
        seed(&caches, EntityKind::User, 1);
        seed(&caches, EntityKind::User, 2);
        seed_collection(&caches, EntityKind::User);

        evict_entity(&caches, EntityKind::User, 1);

        assert!(!is_entity_cached(&caches, EntityKind::User, 1));
        assert!(is_entity_cached(&caches, EntityKind::User, 2));
        assert!(!is_cached(&caches, EntityKind::User, &keys::kind_prefix(EntityKind::User)));
    }

    #[test]
    fn eviction_never_creates_a_cache() {
        let caches = caches();
        evict_entity(&caches, EntityKind::Media, 1);
        evict_entity_by_key(&caches, EntityKind::Media, Uuid::from_u128(1));

        assert!(caches.isolated_caches().kinds().is_empty());
    }

    #[test]
    fn nil_key_is_ignored() {
        let caches = caches();
        let nil_key = keys::entity_key_by_uuid(EntityKind::Content, Uuid::nil());
        seed_at(&caches, EntityKind::Content, &nil_key, "-1");

        evict_entity_by_key(&caches, EntityKind::Content, Uuid::nil());
        assert!(is_cached(&caches, EntityKind::Content, &nil_key));
    }

    #[test]
    fn clear_kind_leaves_other_kinds_alone() {
        let caches = caches();
        seed(&caches, EntityKind::Domain, 1);
        seed(&caches, EntityKind::Language, 1);

        clear_kind(&caches, EntityKind::Domain);

        assert_eq!(count(&caches, EntityKind::Domain), 0);
        assert_eq!(count(&caches, EntityKind::Language), 1);
    }
}
