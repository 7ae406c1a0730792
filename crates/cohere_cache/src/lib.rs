// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache surfaces for a multi-server content store.
//!
//! This crate provides the local half of cache coherence:
//! - A value cache with single-flight computation and per-entry expiration ([`LazyStore`])
//! - Object-safe cache surfaces with typed extension traits ([`AppCache`], [`AppPolicyCache`])
//! - A pass-through surface that stores nothing ([`NoAppCache`])
//! - A decorator that hands out deep copies of stored entities ([`DeepCloneAppCache`])
//! - One isolated surface per entity kind ([`IsolatedCaches`])
//! - Structured logging and optional OpenTelemetry metrics ([`CacheTelemetry`])
//!
//! # Examples
//!
//! ```
//! use cohere_cache::{AppCacheExt, AppCaches, AppPolicyCacheExt, EntityKind, EntryPolicy};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let caches = AppCaches::builder(Clock::new_frozen()).build();
//! let templates = caches.isolated_caches().get_or_create(EntityKind::Template);
//!
//! templates.insert_value("uRepo_Template_7", String::from("master"), &EntryPolicy::none()).await?;
//! templates.clear_of_kind(EntityKind::Template);
//!
//! assert_eq!(templates.get_string("uRepo_Template_7"), Some(Some(String::from("master"))));
//! # Ok::<(), cohere_cache::Error>(())
//! # });
//! ```
//!
//! Plain strings carry no entity kind, so kind-based eviction leaves them alone; evict them by key instead.

mod app_caches;
mod deep_clone;
mod entry_policy;
mod error;
mod isolated;
pub mod keys;
mod kind;
mod lazy;
mod no_cache;
mod object;
mod surface;
mod telemetry;
pub mod value;

#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

#[doc(inline)]
pub use app_caches::{AppCaches, AppCachesBuilder};
#[doc(inline)]
pub use deep_clone::DeepCloneAppCache;
#[doc(inline)]
pub use entry_policy::EntryPolicy;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use isolated::IsolatedCaches;
#[doc(inline)]
pub use kind::{EntityKind, KindDescriptor};
#[doc(inline)]
pub use lazy::LazyStore;
#[doc(inline)]
pub use no_cache::NoAppCache;
#[doc(inline)]
pub use object::{ObjectCache, ObjectCacheBuilder};
#[doc(inline)]
pub use surface::{AppCache, AppCacheExt, AppPolicyCache, AppPolicyCacheExt, CacheResult, EvictionPredicate, ValueFactory};
#[doc(inline)]
pub use telemetry::CacheTelemetry;
#[doc(inline)]
pub use value::{AsAny, CacheValue, NullRepresentation, downcast_arc};
