// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache coherence for a content store served by many servers from one database.
//!
//! Each server keeps its own caches. Writes go through a repository cache policy, which keeps the local caches
//! honest about what the store accepted, and through [`DistributedCache`], which evicts the stale entries
//! locally and queues the same eviction for every peer. Version stamps per entity kind catch a server that
//! missed an eviction.
//!
//! [`CacheRuntime`] wires these pieces for one server process and registers the built-in
//! [`refreshers`].
//!
//! # Examples
//!
//! ```
//! use cohere::refreshers::{ContentCacheRefresher, ContentPayload, TreeChangeTypes};
//! use cohere::{
//!     BatchedMessengerOptions, CacheRuntime, InMemoryInstructionStore, InstructionProcessorOptions,
//! };
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let log = InMemoryInstructionStore::new(Clock::new_frozen());
//! let start = || {
//!     CacheRuntime::builder(Clock::new_frozen())
//!         .batched(log.clone(), BatchedMessengerOptions::default())
//!         .build()
//! };
//! let server_a = start()?;
//! let server_b = start()?;
//! let inbox_b = server_b.processor(log.clone(), InstructionProcessorOptions::default());
//!
//! server_a
//!     .distributed()
//!     .refresh_payloads::<ContentCacheRefresher>(&[ContentPayload::new(1, TreeChangeTypes::REMOVE)])
//!     .await?;
//!
//! assert_eq!(inbox_b.sync().await?.processed, 1);
//! # Ok::<(), cohere::Error>(())
//! # });
//! ```

mod runtime;

#[doc(inline)]
pub use cohere_cache::{
    AppCache, AppCacheExt, AppCaches, AppCachesBuilder, AppPolicyCache, AppPolicyCacheExt, CacheTelemetry,
    CacheValue, DeepCloneAppCache, EntityKind, EntryPolicy, Error, ErrorKind, IsolatedCaches, LazyStore,
    NoAppCache, ObjectCache, ObjectCacheBuilder, Result, keys,
};
#[doc(inline)]
pub use cohere_repository::{
    CacheScope, CacheSync, CachedEntity, DefaultRepositoryCachePolicy, EntityStore, FullDataSetOptions,
    FullDataSetRepositoryCachePolicy, NoCacheRepositoryCachePolicy, PendingInvalidation, RepositoryCachePolicy,
    RepositoryCachePolicyOptions, ScopedRepositoryCachePolicy, SingleItemsOnlyRepositoryCachePolicy,
    SyncedRepositoryCachePolicy,
};
#[doc(inline)]
pub use cohere_sync::{
    BatchedMessenger, BatchedMessengerOptions, CacheRefresher, CacheRefresherNotification, CacheRefresherRegistry,
    CacheVersion, CacheVersionService, DistributedCache, FileSyncCursor, IdCacheRefresher, InMemoryInstructionStore,
    InMemorySyncCursor, InMemoryVersionStore, InProcessVersionLock, InstructionProcessor, InstructionProcessorOptions,
    InstructionStore, KeyCacheRefresher, LocalOnlyMessenger, PayloadCacheRefresher, RefreshInstruction,
    RefreshRequest, RefresherEntry, RefresherMessage, RefresherNotifications, RepositoryCacheVersionService,
    ServerMessenger, SingleServerCacheVersionService, StartupMode, SyncCursorStore, SyncReport, VersionLock,
    VersionServiceOptions, VersionStore, refreshers,
};
#[doc(inline)]
pub use runtime::{CacheRuntime, CacheRuntimeBuilder};
