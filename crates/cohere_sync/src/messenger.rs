// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Messengers hand invalidation instructions to the other servers of a deployment.

use std::fmt::Debug;

use cohere_cache::{Error, Result};
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instruction::{InstructionBatch, RefreshInstruction};
use crate::instruction_store::InstructionStore;

const DEFAULT_MAX_INSTRUCTIONS_PER_BATCH: usize = 1000;

/// Queues invalidation instructions for delivery to peer servers.
///
/// Delivery is at-least-once and unordered; refreshers make repeated application harmless. Only
/// [`ServerMessenger::deliver`] is required, the `queue_*` helpers build the instructions for each message
/// shape.
pub trait ServerMessenger: Send + Sync + Debug {
    /// Queues `instructions` for every peer.
    ///
    /// # Errors
    ///
    /// Returns a delivery error if the instructions could not be queued.
    fn deliver(&self, instructions: Vec<RefreshInstruction>) -> BoxFuture<'_, Result<()>>;

    /// Queues a full refresh.
    fn queue_refresh_all(&self, refresher_id: Uuid) -> BoxFuture<'_, Result<()>> {
        self.deliver(vec![RefreshInstruction::refresh_all(refresher_id)])
    }

    /// Queues a refresh of every id in `ids` as one instruction.
    fn queue_refresh_ids(&self, refresher_id: Uuid, ids: &[i32]) -> BoxFuture<'_, Result<()>> {
        match ids {
            [] => Box::pin(future::ready(Ok(()))),
            [id] => self.deliver(vec![RefreshInstruction::refresh_by_id(refresher_id, *id)]),
            many => match RefreshInstruction::refresh_ids(refresher_id, many) {
                Ok(instruction) => self.deliver(vec![instruction]),
                Err(error) => Box::pin(future::ready(Err(error))),
            },
        }
    }

    /// Queues a refresh of every secondary key in `keys`.
    fn queue_refresh_keys(&self, refresher_id: Uuid, keys: &[Uuid]) -> BoxFuture<'_, Result<()>> {
        self.deliver(
            keys.iter()
                .map(|key| RefreshInstruction::refresh_by_guid(refresher_id, *key))
                .collect(),
        )
    }

    /// Queues the removal of every id in `ids`.
    fn queue_remove_ids(&self, refresher_id: Uuid, ids: &[i32]) -> BoxFuture<'_, Result<()>> {
        self.deliver(ids.iter().map(|id| RefreshInstruction::remove_by_id(refresher_id, *id)).collect())
    }

    /// Queues `count` change descriptions serialized as the JSON array `json`.
    fn queue_refresh_json(&self, refresher_id: Uuid, json: String, count: usize) -> BoxFuture<'_, Result<()>> {
        self.deliver(vec![RefreshInstruction::refresh_by_json(refresher_id, json, count)])
    }
}

/// A messenger for single-server deployments: there is nobody to tell.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnlyMessenger;

impl ServerMessenger for LocalOnlyMessenger {
    fn deliver(&self, instructions: Vec<RefreshInstruction>) -> BoxFuture<'_, Result<()>> {
        tracing::trace!(instruction.count = instructions.len(), "instruction.dropped");
        Box::pin(future::ready(Ok(())))
    }
}

/// Configuration of a [`BatchedMessenger`].
///
/// # Example
///
/// ```
/// use cohere_sync::BatchedMessengerOptions;
///
/// let options: BatchedMessengerOptions = serde_json::from_str(r#"{ "max_instructions_per_batch": 50 }"#)?;
/// assert!(options.distributed_enabled);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchedMessengerOptions {
    /// Identity stamped on every appended batch. A unique identity is generated when unset.
    pub origin: Option<String>,
    /// Upper bound of invalidations per appended batch. A single larger instruction gets a batch of its own.
    pub max_instructions_per_batch: usize,
    /// When `false`, instructions are dropped instead of appended.
    pub distributed_enabled: bool,
}

impl Default for BatchedMessengerOptions {
    fn default() -> Self {
        Self {
            origin: None,
            max_instructions_per_batch: DEFAULT_MAX_INSTRUCTIONS_PER_BATCH,
            distributed_enabled: true,
        }
    }
}

/// Returns an identity unique to this server process.
#[must_use]
pub fn local_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_missing| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_missing| String::from("localhost"));
    format!("{host} [P{}] {}", std::process::id(), Uuid::new_v4().simple())
}

/// A messenger appending instructions to a shared [`InstructionStore`] that peers poll.
///
/// # Example
///
/// ```
/// use cohere_sync::{BatchedMessenger, BatchedMessengerOptions, InMemoryInstructionStore, ServerMessenger};
/// use tick::Clock;
/// use uuid::Uuid;
///
/// # futures::executor::block_on(async {
/// let store = InMemoryInstructionStore::new(Clock::new_frozen());
/// let messenger = BatchedMessenger::new(store.clone(), BatchedMessengerOptions::default());
///
/// messenger.queue_refresh_ids(Uuid::from_u128(7), &[1, 2, 3]).await?;
///
/// let records = store.records();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].origin, messenger.origin());
/// assert_eq!(records[0].instruction_count, 3);
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct BatchedMessenger<S> {
    store: S,
    origin: String,
    options: BatchedMessengerOptions,
}

impl<S: InstructionStore + Debug> BatchedMessenger<S> {
    /// Creates a messenger appending to `store`.
    #[must_use]
    pub fn new(store: S, options: BatchedMessengerOptions) -> Self {
        let origin = options.origin.clone().unwrap_or_else(local_identity);
        Self { store, origin, options }
    }

    /// Returns the identity stamped on appended batches.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the store batches are appended to.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the options of this messenger.
    #[must_use]
    pub fn options(&self) -> &BatchedMessengerOptions {
        &self.options
    }

    fn split(&self, instructions: Vec<RefreshInstruction>) -> Vec<InstructionBatch> {
        let max = self.options.max_instructions_per_batch.max(1);
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut count = 0;

        for instruction in instructions {
            if !current.is_empty() && count + instruction.json_id_count > max {
                batches.push(InstructionBatch::new(self.origin.clone(), std::mem::take(&mut current)));
                count = 0;
            }
            count += instruction.json_id_count;
            current.push(instruction);
        }

        if !current.is_empty() {
            batches.push(InstructionBatch::new(self.origin.clone(), current));
        }

        batches
    }

    async fn append_all(&self, instructions: Vec<RefreshInstruction>) -> Result<()> {
        if !self.options.distributed_enabled || instructions.is_empty() {
            return Ok(());
        }

        for batch in self.split(instructions) {
            let count = batch.instruction_count();
            let json = batch.instructions_json()?;
            let id = self
                .store
                .append(&batch.origin, json, count)
                .await
                .map_err(Error::delivery)?;

            tracing::debug!(
                instruction.id = id,
                instruction.count = count,
                instruction.origin = %batch.origin,
                "instruction.appended"
            );
        }

        Ok(())
    }
}

impl<S: InstructionStore + Debug> ServerMessenger for BatchedMessenger<S> {
    fn deliver(&self, instructions: Vec<RefreshInstruction>) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.append_all(instructions))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::SystemTime;

    use cohere_cache::ErrorKind;
    use futures::executor::block_on;
    use tick::Clock;

    use super::*;
    use crate::instruction::{RefreshMethod, expand_instructions};
    use crate::instruction_store::{InMemoryInstructionStore, InstructionRecord};

    const REFRESHER: Uuid = Uuid::from_u128(0x11);

    fn messenger(max: usize) -> (InMemoryInstructionStore, BatchedMessenger<InMemoryInstructionStore>) {
        let store = InMemoryInstructionStore::new(Clock::new_frozen());
        let options = BatchedMessengerOptions {
            origin: Some(String::from("node-a")),
            max_instructions_per_batch: max,
            distributed_enabled: true,
        };
        (store.clone(), BatchedMessenger::new(store, options))
    }

    #[test]
    fn batches_respect_the_instruction_limit() {
        block_on(async {
            let (store, messenger) = messenger(2);

            messenger.queue_remove_ids(REFRESHER, &[1, 2, 3, 4, 5]).await.expect("queue");

            let counts: Vec<_> = store.records().iter().map(|r| r.instruction_count).collect();
            assert_eq!(counts, vec![2, 2, 1]);
            assert!(store.records().iter().all(|r| r.origin == "node-a"));
        });
    }

    #[test]
    fn oversized_instruction_gets_its_own_batch() {
        block_on(async {
            let (store, messenger) = messenger(2);

            messenger
                .deliver(vec![
                    RefreshInstruction::refresh_all(REFRESHER),
                    RefreshInstruction::refresh_ids(REFRESHER, &[1, 2, 3]).expect("ids"),
                    RefreshInstruction::refresh_all(REFRESHER),
                ])
                .await
                .expect("deliver");

            let counts: Vec<_> = store.records().iter().map(|r| r.instruction_count).collect();
            assert_eq!(counts, vec![1, 3, 1]);
        });
    }

    #[test]
    fn single_id_is_sent_as_refresh_by_id() {
        block_on(async {
            let (store, messenger) = messenger(10);

            messenger.queue_refresh_ids(REFRESHER, &[7]).await.expect("queue");
            messenger.queue_refresh_ids(REFRESHER, &[]).await.expect("queue nothing");

            let records = store.records();
            assert_eq!(records.len(), 1);
            let instructions = expand_instructions(&records[0].instructions).expect("expand");
            assert_eq!(instructions, vec![RefreshInstruction::refresh_by_id(REFRESHER, 7)]);
        });
    }

    #[test]
    fn payloads_and_keys_are_queued() {
        block_on(async {
            let (store, messenger) = messenger(10);
            let key = Uuid::from_u128(99);

            messenger.queue_refresh_keys(REFRESHER, &[key]).await.expect("keys");
            messenger
                .queue_refresh_json(REFRESHER, String::from(r#"[{"id":1},{"id":2}]"#), 2)
                .await
                .expect("json");
            messenger.queue_refresh_all(REFRESHER).await.expect("all");

            let methods: Vec<_> = store
                .records()
                .iter()
                .flat_map(|r| expand_instructions(&r.instructions).expect("expand"))
                .map(|i| i.method)
                .collect();
            assert_eq!(
                methods,
                vec![RefreshMethod::RefreshByGuid, RefreshMethod::RefreshByJson, RefreshMethod::RefreshAll]
            );
        });
    }

    #[test]
    fn disabled_distribution_appends_nothing() {
        block_on(async {
            let store = InMemoryInstructionStore::new(Clock::new_frozen());
            let options = BatchedMessengerOptions {
                distributed_enabled: false,
                ..BatchedMessengerOptions::default()
            };
            let messenger = BatchedMessenger::new(store.clone(), options);

            messenger.queue_refresh_all(REFRESHER).await.expect("queue");
            assert!(store.is_empty());
        });
    }

    #[test]
    fn generated_origins_are_unique() {
        let store = InMemoryInstructionStore::new(Clock::new_frozen());
        let first = BatchedMessenger::new(store.clone(), BatchedMessengerOptions::default());
        let second = BatchedMessenger::new(store, BatchedMessengerOptions::default());

        assert_ne!(first.origin(), second.origin());
        assert!(first.origin().contains(&format!("[P{}]", std::process::id())));
    }

    #[derive(Debug)]
    struct Unreachable;

    impl InstructionStore for Unreachable {
        async fn append(&self, _origin: &str, _instructions: String, _count: usize) -> Result<u64> {
            Err(Error::persistence("connection refused"))
        }

        async fn fetch_after(&self, _last_id: u64, _limit: usize) -> Result<Vec<InstructionRecord>> {
            Ok(Vec::new())
        }

        async fn count_after(&self, _last_id: u64) -> Result<usize> {
            Ok(0)
        }

        async fn max_id(&self) -> Result<Option<u64>> {
            Ok(None)
        }

        async fn contains(&self, _id: u64) -> Result<bool> {
            Ok(false)
        }

        async fn prune(&self, _older_than: SystemTime, _keep_max_id: u64) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn store_failures_surface_as_delivery_errors() {
        block_on(async {
            let messenger: Arc<dyn ServerMessenger> =
                Arc::new(BatchedMessenger::new(Unreachable, BatchedMessengerOptions::default()));

            let error = messenger.queue_refresh_all(REFRESHER).await.expect_err("store down");
            assert_eq!(error.kind(), ErrorKind::Delivery);
            assert!(error.to_string().contains("connection refused"), "got: {error}");
        });
    }

    #[test]
    fn local_only_messenger_accepts_everything() {
        block_on(async {
            LocalOnlyMessenger.queue_remove_ids(REFRESHER, &[1, 2]).await.expect("dropped");
        });
    }
}
