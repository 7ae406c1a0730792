// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Repository cache policies.
//!
//! A data-access layer consults one [`RepositoryCachePolicy`] per entity kind for every read and write.
//! The policy decides what to cache and for how long, and keeps the cache consistent with what the store
//! actually accepted:
//! - [`DefaultRepositoryCachePolicy`] caches each entity under its own key
//! - [`FullDataSetRepositoryCachePolicy`] caches the whole collection of a small kind as one unit
//! - [`SingleItemsOnlyRepositoryCachePolicy`] caches single reads but never bulk results
//! - [`NoCacheRepositoryCachePolicy`] sends everything to the store
//! - [`ScopedRepositoryCachePolicy`] confines writes of a unit of work to a [`CacheScope`] and returns the
//!   invalidations owed to the shared caches as a [`PendingInvalidation`]
//!
//! [`SyncedRepositoryCachePolicy`] wraps any of them and runs a [`CacheSync`] check before each read, so
//! caches another server invalidated are dropped first.
//!
//! # Examples
//!
//! ```
//! use cohere_cache::{AppCaches, EntityKind, Result};
//! use cohere_repository::{CachedEntity, DefaultRepositoryCachePolicy, EntityStore, RepositoryCachePolicy};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Media {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl CachedEntity for Media {
//!     const KIND: EntityKind = EntityKind::Media;
//!     type Id = i32;
//!
//!     fn id(&self) -> i32 {
//!         self.id
//!     }
//! }
//!
//! struct MediaTable(Vec<Media>);
//!
//! impl EntityStore<Media> for MediaTable {
//!     async fn load_one(&self, id: &i32) -> Result<Option<Media>> {
//!         Ok(self.0.iter().find(|m| m.id == *id).cloned())
//!     }
//!
//!     async fn load_many(&self, _ids: &[i32]) -> Result<Vec<Media>> {
//!         Ok(self.0.clone())
//!     }
//!
//!     async fn exists(&self, id: &i32) -> Result<bool> {
//!         Ok(self.0.iter().any(|m| m.id == *id))
//!     }
//!
//!     async fn count(&self) -> Result<usize> {
//!         Ok(self.0.len())
//!     }
//! }
//!
//! let caches = AppCaches::builder(Clock::new_frozen()).build();
//! let policy = DefaultRepositoryCachePolicy::<Media>::new(
//!     caches.isolated_caches().get_or_create(EntityKind::Media),
//!     Default::default(),
//! );
//! let store = MediaTable(vec![Media { id: 3, name: "logo.png".into() }]);
//!
//! let media = policy.get(&3, &store).await?;
//! assert_eq!(media.map(|m| m.name), Some("logo.png".to_string()));
//! # Ok::<(), cohere_cache::Error>(())
//! # });
//! ```

mod default;
mod entity;
mod full_data_set;
mod guard;
mod no_cache;
mod options;
mod policy;
pub mod scoped;
mod single_items;
mod store;
mod synced;

#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

#[doc(inline)]
pub use default::DefaultRepositoryCachePolicy;
#[doc(inline)]
pub use entity::{CachedEntity, CachedEntityValue, EntityList};
#[doc(inline)]
pub use full_data_set::FullDataSetRepositoryCachePolicy;
#[doc(inline)]
pub use no_cache::NoCacheRepositoryCachePolicy;
#[doc(inline)]
pub use options::{DEFAULT_ENTITY_TIMEOUT, FullDataSetOptions, RepositoryCachePolicyOptions};
#[doc(inline)]
pub use policy::RepositoryCachePolicy;
#[doc(inline)]
pub use scoped::{CacheScope, Invalidation, PendingInvalidation, ScopedRepositoryCachePolicy};
#[doc(inline)]
pub use single_items::SingleItemsOnlyRepositoryCachePolicy;
#[doc(inline)]
pub use store::EntityStore;
#[doc(inline)]
pub use synced::{CacheSync, SyncedRepositoryCachePolicy};
