// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Keeping the caches of many servers consistent with one database of record.
//!
//! A write on one server becomes a typed invalidation that every server applies to its own caches:
//! - [`CacheRefresher`] and its capability traits describe what a refresher can evict and how
//! - [`CacheRefresherRegistry`] resolves refreshers by their stable identifier and applies instructions
//! - [`DistributedCache`] applies a refresh locally, then queues it through a [`ServerMessenger`]
//! - [`BatchedMessenger`] and [`InstructionProcessor`] move [`RefreshInstruction`]s between servers through a
//!   shared [`InstructionStore`]
//! - [`SyncCursorStore`] keeps the position of an [`InstructionProcessor`] across restarts
//! - [`RepositoryCacheVersionService`] detects a server that missed instructions by comparing version stamps
//!
//! The built-in refreshers for the platform's entity kinds live in [`refreshers`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use cohere_cache::{AppCaches, EntityKind};
//! use cohere_sync::refreshers::{ContentCacheRefresher, ContentPayload, TreeChangeTypes};
//! use cohere_sync::{
//!     BatchedMessenger, BatchedMessengerOptions, CacheRefresherRegistry, DistributedCache,
//!     InMemoryInstructionStore, InstructionProcessor, InstructionProcessorOptions, RefresherEntry,
//! };
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! fn registry(caches: &AppCaches) -> cohere_cache::Result<Arc<CacheRefresherRegistry>> {
//!     let registry = CacheRefresherRegistry::builder()
//!         .register(RefresherEntry::new(ContentCacheRefresher::new(caches.clone())).by_payload())
//!         .build()?;
//!     Ok(Arc::new(registry))
//! }
//!
//! let log = InMemoryInstructionStore::new(Clock::new_frozen());
//!
//! // Server A applies an edit and queues it.
//! let caches_a = AppCaches::builder(Clock::new_frozen()).build();
//! let messenger = BatchedMessenger::new(log.clone(), BatchedMessengerOptions::default());
//! let distributed = DistributedCache::new(registry(&caches_a)?, Arc::new(messenger));
//! distributed
//!     .refresh_payloads::<ContentCacheRefresher>(&[ContentPayload::new(1234, TreeChangeTypes::REFRESH_BRANCH)])
//!     .await?;
//!
//! // Server B picks it up on its next sync.
//! let caches_b = AppCaches::builder(Clock::new_frozen()).build();
//! let options = InstructionProcessorOptions::default();
//! let processor =
//!     InstructionProcessor::new(log, registry(&caches_b)?, "server-b", options, Clock::new_frozen())
//!         .with_last_synced_id(0);
//! let report = processor.sync().await?;
//!
//! assert_eq!(report.processed, 1);
//! # Ok::<(), cohere_cache::Error>(())
//! # });
//! ```

mod cursor;
mod distributed;
mod instruction;
mod instruction_store;
mod messenger;
mod notifications;
mod processor;
mod refresher;
pub mod refreshers;
mod registry;
mod version;

#[doc(inline)]
pub use cursor::{FileSyncCursor, InMemorySyncCursor, SyncCursorStore};
#[doc(inline)]
pub use distributed::{DistributedCache, RefreshRequest};
#[doc(inline)]
pub use instruction::{InstructionBatch, RefreshInstruction, RefreshMethod, expand_instructions};
#[doc(inline)]
pub use instruction_store::{InMemoryInstructionStore, InstructionRecord, InstructionStore};
#[doc(inline)]
pub use messenger::{BatchedMessenger, BatchedMessengerOptions, LocalOnlyMessenger, ServerMessenger, local_identity};
#[doc(inline)]
pub use notifications::{CacheRefresherNotification, RefresherMessage, RefresherNotifications};
#[doc(inline)]
pub use processor::{InstructionProcessor, InstructionProcessorOptions, StartupMode, SyncReport};
#[doc(inline)]
pub use refresher::{CacheRefresher, IdCacheRefresher, KeyCacheRefresher, PayloadCacheRefresher};
#[doc(inline)]
pub use registry::{CacheRefresherRegistry, CacheRefresherRegistryBuilder, MessageShape, Registration, RefresherEntry};
#[doc(inline)]
pub use version::{
    CacheVersion, CacheVersionService, InMemoryVersionStore, InProcessVersionLock, RepositoryCacheVersionService,
    SingleServerCacheVersionService, VersionLock, VersionServiceOptions, VersionStore,
};
