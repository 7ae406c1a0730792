// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use cohere_cache::Result;
use parking_lot::Mutex;
use tick::Clock;

/// A batch of serialized instructions as kept by an [`InstructionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Store-assigned identifier, increasing with every appended batch.
    pub id: u64,
    /// Identity of the server that queued the batch.
    pub origin: String,
    /// The instructions as a JSON array.
    pub instructions: String,
    /// Number of invalidations the batch stands for.
    pub instruction_count: usize,
    /// When the batch was appended.
    pub created: SystemTime,
}

/// Durable, shared log of instruction batches that every server reads.
pub trait InstructionStore: Send + Sync {
    /// Appends a batch and returns its identifier.
    fn append(&self, origin: &str, instructions: String, instruction_count: usize) -> impl Future<Output = Result<u64>> + Send;

    /// Returns up to `limit` batches whose identifier is greater than `last_id`, in identifier order.
    fn fetch_after(&self, last_id: u64, limit: usize) -> impl Future<Output = Result<Vec<InstructionRecord>>> + Send;

    /// Returns the number of invalidations in batches after `last_id`.
    fn count_after(&self, last_id: u64) -> impl Future<Output = Result<usize>> + Send;

    /// Returns the identifier of the newest batch, or `None` if the log is empty.
    fn max_id(&self) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Returns `true` if the batch `id` is still in the log.
    fn contains(&self, id: u64) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes the batches appended before `older_than`, except `keep_max_id` and anything newer, and
    /// returns how many were deleted.
    ///
    /// Keeping the newest batch lets a server whose cursor points at it resume after a quiet period
    /// instead of cold booting.
    fn prune(&self, older_than: SystemTime, keep_max_id: u64) -> impl Future<Output = Result<usize>> + Send;
}

/// An [`InstructionStore`] kept in process memory.
///
/// Clones share the same log, so servers simulated in one process see each other's batches. Batches are
/// stamped with the time of `clock`.
///
/// # Example
///
/// ```
/// use cohere_sync::{InMemoryInstructionStore, InstructionStore};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let store = InMemoryInstructionStore::new(Clock::new_frozen());
/// let id = store.append("node-a", String::from("[]"), 1).await?;
///
/// assert_eq!(store.max_id().await?, Some(id));
/// assert!(store.fetch_after(id, 10).await?.is_empty());
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryInstructionStore {
    records: Arc<Mutex<Vec<InstructionRecord>>>,
    clock: Clock,
}

impl InMemoryInstructionStore {
    /// Creates an empty log.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            records: Arc::default(),
            clock,
        }
    }

    /// Returns every batch in the log.
    #[must_use]
    pub fn records(&self) -> Vec<InstructionRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of batches in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl InstructionStore for InMemoryInstructionStore {
    async fn append(&self, origin: &str, instructions: String, instruction_count: usize) -> Result<u64> {
        let mut records = self.records.lock();
        let id = records.last().map_or(1, |last| last.id + 1);
        records.push(InstructionRecord {
            id,
            origin: origin.to_owned(),
            instructions,
            instruction_count,
            created: self.clock.system_time(),
        });
        Ok(id)
    }

    async fn fetch_after(&self, last_id: u64, limit: usize) -> Result<Vec<InstructionRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|record| record.id > last_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_after(&self, last_id: u64) -> Result<usize> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|record| record.id > last_id)
            .map(|record| record.instruction_count)
            .sum())
    }

    async fn max_id(&self) -> Result<Option<u64>> {
        Ok(self.records.lock().last().map(|record| record.id))
    }

    async fn contains(&self, id: u64) -> Result<bool> {
        Ok(self.records.lock().iter().any(|record| record.id == id))
    }

    async fn prune(&self, older_than: SystemTime, keep_max_id: u64) -> Result<usize> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| record.id >= keep_max_id || record.created >= older_than);
        Ok(before - records.len())
    }
}
