// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Applies the instruction batches queued by peer servers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cohere_cache::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tick::Clock;

use crate::cursor::{InMemorySyncCursor, SyncCursorStore};
use crate::instruction::{RefreshInstruction, expand_instructions};
use crate::instruction_store::{InstructionRecord, InstructionStore};
use crate::registry::CacheRefresherRegistry;

const DEFAULT_FETCH_LIMIT: usize = 100;
const DEFAULT_MAX_PROCESSING_INSTRUCTIONS: usize = 1000;
const DEFAULT_PRUNE_THROTTLE: Duration = Duration::from_secs(60);
const DEFAULT_RETAIN_INSTRUCTIONS: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Configuration of an [`InstructionProcessor`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use cohere_sync::InstructionProcessorOptions;
///
/// let options: InstructionProcessorOptions =
///     serde_json::from_str(r#"{ "sync_throttle": { "secs": 5, "nanos": 0 }, "prune": false }"#)?;
/// assert_eq!(options.sync_throttle, Duration::from_secs(5));
/// assert_eq!(options.fetch_limit, 100);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionProcessorOptions {
    /// Number of batches fetched per [`InstructionProcessor::sync`].
    pub fetch_limit: usize,
    /// Pending invalidations above which [`InstructionProcessor::initialize`] cold boots instead of catching up.
    pub max_processing_instructions: usize,
    /// Minimum time between two syncs that read the store. Syncs requested sooner return at once.
    pub sync_throttle: Duration,
    /// Whether this server deletes old batches from the store. Enable it on one server of a deployment.
    pub prune: bool,
    /// Minimum time between two prunes.
    pub prune_throttle: Duration,
    /// Age after which a batch may be pruned.
    pub retain_instructions: Duration,
}

impl Default for InstructionProcessorOptions {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_processing_instructions: DEFAULT_MAX_PROCESSING_INSTRUCTIONS,
            sync_throttle: Duration::ZERO,
            prune: true,
            prune_throttle: DEFAULT_PRUNE_THROTTLE,
            retain_instructions: DEFAULT_RETAIN_INSTRUCTIONS,
        }
    }
}

/// What one [`InstructionProcessor::sync`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Instructions applied to the local caches.
    pub processed: usize,
    /// Batches skipped because this server queued them.
    pub skipped_local: usize,
    /// Batches skipped because their instructions could not be parsed.
    pub malformed: usize,
    /// Batches whose application failed.
    pub failed: usize,
    /// Batches deleted from the store because they aged out.
    pub pruned: usize,
    /// `true` if the sync came too soon after the previous one and did nothing.
    pub throttled: bool,
    /// The cursor after the sync.
    pub last_id: u64,
}

/// How [`InstructionProcessor::initialize`] positioned the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// The cursor was moved past every batch; the host must rebuild its caches from the store.
    ColdBoot,
    /// The cursor is kept and pending batches are applied by the next sync.
    Resume,
}

/// Reads the batches peers appended to an [`InstructionStore`] and applies them through the refresher
/// registry.
///
/// Batches this server appended itself are skipped: they were applied locally when they were queued.
/// The cursor is saved to a [`SyncCursorStore`] after every move, so a restarted server resumes where it
/// stopped. Without [`InstructionProcessor::with_cursor_store`] the cursor lives in memory only.
#[derive(Debug)]
pub struct InstructionProcessor<S> {
    store: S,
    registry: Arc<CacheRefresherRegistry>,
    origin: String,
    options: InstructionProcessorOptions,
    clock: Clock,
    cursor: Arc<dyn SyncCursorStore>,
    last_synced_id: Mutex<Option<u64>>,
    last_sync: Mutex<Instant>,
    last_pruned: Mutex<Instant>,
}

impl<S: InstructionStore> InstructionProcessor<S> {
    /// Creates a processor that has never synced.
    ///
    /// `origin` must be the identity the local messenger stamps on its batches. Throttling and pruning
    /// follow `clock`; both throttles start counting at creation.
    #[must_use]
    pub fn new(
        store: S,
        registry: Arc<CacheRefresherRegistry>,
        origin: impl Into<String>,
        options: InstructionProcessorOptions,
        clock: Clock,
    ) -> Self {
        let now = clock.instant();
        Self {
            store,
            registry,
            origin: origin.into(),
            options,
            clock,
            cursor: Arc::new(InMemorySyncCursor::new()),
            last_synced_id: Mutex::new(None),
            last_sync: Mutex::new(now),
            last_pruned: Mutex::new(now),
        }
    }

    /// Saves the cursor to `cursor`. [`InstructionProcessor::initialize`] resumes from the cursor it holds.
    #[must_use]
    pub fn with_cursor_store(mut self, cursor: Arc<dyn SyncCursorStore>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Resumes from a known cursor instead of the saved one.
    #[must_use]
    pub fn with_last_synced_id(self, last_synced_id: u64) -> Self {
        *self.last_synced_id.lock() = Some(last_synced_id);
        self
    }

    /// Returns the identifier of the last batch handled, or `None` if the processor never synced.
    #[must_use]
    pub fn last_synced_id(&self) -> Option<u64> {
        *self.last_synced_id.lock()
    }

    /// Returns the store batches are read from.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Positions the cursor at startup.
    ///
    /// The cursor is taken from [`InstructionProcessor::with_last_synced_id`] or else read from the cursor
    /// store. A server cold boots when it never synced, when the batch its cursor points at was pruned, or
    /// when it is too far behind: catching up instruction by instruction would cost more than rebuilding
    /// its caches, and a pruned batch means instructions it needed are gone. A cursor of `0` resumes only
    /// while the store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the cursor store cannot be read.
    pub async fn initialize(&self) -> Result<StartupMode> {
        let remembered = match self.last_synced_id() {
            Some(last_id) => Some(last_id),
            None => self.cursor.read().await?,
        };

        let Some(last_id) = self.verify_cursor(remembered).await? else {
            self.initialize_cold_boot().await?;
            return Ok(StartupMode::ColdBoot);
        };
        *self.last_synced_id.lock() = Some(last_id);

        let pending = self.store.count_after(last_id).await?;
        if pending > self.options.max_processing_instructions {
            tracing::warn!(
                instruction.pending = pending,
                instruction.max = self.options.max_processing_instructions,
                "instruction.too_many_pending"
            );
            self.initialize_cold_boot().await?;
            return Ok(StartupMode::ColdBoot);
        }

        Ok(StartupMode::Resume)
    }

    /// Drops a cursor whose batch is no longer in the store.
    async fn verify_cursor(&self, cursor: Option<u64>) -> Result<Option<u64>> {
        let Some(last_id) = cursor else {
            tracing::warn!("instruction.never_synced");
            return Ok(None);
        };

        let present = if last_id == 0 {
            self.store.max_id().await?.is_none()
        } else {
            self.store.contains(last_id).await?
        };

        if !present {
            tracing::warn!(instruction.id = last_id, "instruction.cursor_missing");
            return Ok(None);
        }

        Ok(Some(last_id))
    }

    /// Moves the cursor past every batch without applying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the cursor cannot be saved.
    pub async fn initialize_cold_boot(&self) -> Result<u64> {
        let last_id = self.store.max_id().await?.unwrap_or(0);
        *self.last_synced_id.lock() = Some(last_id);
        self.cursor.save(last_id).await?;
        tracing::info!(instruction.id = last_id, "instruction.cold_boot");
        Ok(last_id)
    }

    /// Applies the next batches queued by peers, then prunes the store when due.
    ///
    /// Malformed batches and batches whose application fails are logged and skipped; the cursor advances
    /// past them either way. Identical instructions are applied once per sync. A sync requested within
    /// [`InstructionProcessorOptions::sync_throttle`] of the previous one reports `throttled` and reads
    /// nothing. Failures to save the cursor or to prune are logged; the batches are applied regardless.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. The cursor is left untouched in that case.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut last_id = self.last_synced_id().unwrap_or(0);

        if !self.due(&self.last_sync, self.options.sync_throttle) {
            return Ok(SyncReport {
                throttled: true,
                last_id,
                ..SyncReport::default()
            });
        }

        let records = self.store.fetch_after(last_id, self.options.fetch_limit).await?;

        let mut report = SyncReport::default();
        let mut processed = HashSet::new();
        let previous = last_id;

        for record in records {
            last_id = last_id.max(record.id);
            self.process(&record, &mut processed, &mut report);
        }

        *self.last_synced_id.lock() = Some(last_id);
        report.last_id = last_id;

        if last_id != previous
            && let Err(error) = self.cursor.save(last_id).await
        {
            tracing::warn!(instruction.id = last_id, error = %error, "instruction.cursor_not_saved");
        }

        if self.options.prune && self.due(&self.last_pruned, self.options.prune_throttle) {
            match self.prune().await {
                Ok(pruned) => report.pruned = pruned,
                Err(error) => tracing::warn!(error = %error, "instruction.prune_failed"),
            }
        }

        let idle = SyncReport {
            last_id,
            ..SyncReport::default()
        };
        if report != idle {
            tracing::info!(
                instruction.id = last_id,
                instruction.processed = report.processed,
                instruction.skipped_local = report.skipped_local,
                instruction.malformed = report.malformed,
                instruction.failed = report.failed,
                instruction.pruned = report.pruned,
                "instruction.synced"
            );
        }

        Ok(report)
    }

    /// Claims the slot guarded by `last` if `throttle` has passed since it was last claimed.
    fn due(&self, last: &Mutex<Instant>, throttle: Duration) -> bool {
        let now = self.clock.instant();
        let mut last = last.lock();
        if now.saturating_duration_since(*last) < throttle {
            return false;
        }
        *last = now;
        true
    }

    async fn prune(&self) -> Result<usize> {
        let Some(older_than) = self.clock.system_time().checked_sub(self.options.retain_instructions) else {
            return Ok(0);
        };

        match self.store.max_id().await? {
            Some(max_id) => self.store.prune(older_than, max_id).await,
            None => Ok(0),
        }
    }

    fn process(&self, record: &InstructionRecord, processed: &mut HashSet<RefreshInstruction>, report: &mut SyncReport) {
        if record.origin == self.origin {
            report.skipped_local += 1;
            return;
        }

        let instructions = match expand_instructions(&record.instructions) {
            Ok(instructions) => instructions,
            Err(error) => {
                tracing::warn!(
                    instruction.id = record.id,
                    instruction.origin = %record.origin,
                    error = %error,
                    "instruction.malformed"
                );
                report.malformed += 1;
                return;
            }
        };

        for instruction in instructions {
            if processed.contains(&instruction) {
                continue;
            }

            if let Err(error) = self.registry.apply(&instruction) {
                tracing::error!(
                    instruction.id = record.id,
                    instruction.origin = %record.origin,
                    refresher.id = %instruction.refresher_id,
                    error = %error,
                    "distributed cache is not updated, instruction batch skipped"
                );
                report.failed += 1;
                return;
            }

            report.processed += 1;
            processed.insert(instruction);
        }
    }
}

#[cfg(test)]
mod tests {
    use cohere_cache::EntityKind;
    use cohere_cache::testing::LogCapture;
    use futures::executor::block_on;
    use tick::ClockControl;
    use uuid::Uuid;

    use super::*;
    use crate::cursor::InMemorySyncCursor;
    use crate::instruction::InstructionBatch;
    use crate::instruction_store::InMemoryInstructionStore;
    use crate::refresher::{CacheRefresher, IdCacheRefresher};
    use crate::registry::RefresherEntry;

    #[derive(Debug, Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<i32>>>);

    impl CacheRefresher for Recorder {
        const UNIQUE_ID: Uuid = Uuid::from_u128(0x21);
        const NAME: &'static str = "recorder";
        const KIND: EntityKind = EntityKind::Member;

        fn refresh_all(&self) {
            self.0.lock().push(0);
        }
    }

    impl IdCacheRefresher for Recorder {
        fn refresh_id(&self, id: i32) {
            self.0.lock().push(id);
        }
    }

    struct Fixture {
        store: InMemoryInstructionStore,
        recorder: Recorder,
        processor: InstructionProcessor<InMemoryInstructionStore>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryInstructionStore::new(Clock::new_frozen());
        let recorder = Recorder::default();
        let registry = CacheRefresherRegistry::builder()
            .register(RefresherEntry::new(recorder.clone()).by_id())
            .build()
            .expect("registry");
        let processor = InstructionProcessor::new(
            store.clone(),
            Arc::new(registry),
            "node-b",
            InstructionProcessorOptions::default(),
            Clock::new_frozen(),
        )
        .with_last_synced_id(0);

        Fixture {
            store,
            recorder,
            processor,
        }
    }

    async fn append(store: &InMemoryInstructionStore, origin: &str, instructions: Vec<RefreshInstruction>) -> u64 {
        let batch = InstructionBatch::new(origin, instructions);
        store
            .append(origin, batch.instructions_json().expect("json"), batch.instruction_count())
            .await
            .expect("append")
    }

    #[test]
    fn applies_peer_batches_and_skips_local_ones() {
        block_on(async {
            let f = fixture();
            append(&f.store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 1)]).await;
            append(&f.store, "node-b", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 2)]).await;
            let last = append(&f.store, "node-c", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;

            let report = f.processor.sync().await.expect("sync");

            assert_eq!(*f.recorder.0.lock(), vec![1, 0]);
            assert_eq!(report.processed, 2);
            assert_eq!(report.skipped_local, 1);
            assert_eq!(report.last_id, last);
            assert_eq!(f.processor.last_synced_id(), Some(last));

            let again = f.processor.sync().await.expect("second sync");
            assert_eq!(again, SyncReport { last_id: last, ..SyncReport::default() });
        });
    }

    #[test]
    fn identical_instructions_apply_once_per_sync() {
        block_on(async {
            let f = fixture();
            let instruction = RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 7);
            append(&f.store, "node-a", vec![instruction.clone(), instruction.clone()]).await;
            append(&f.store, "node-c", vec![instruction]).await;

            let report = f.processor.sync().await.expect("sync");

            assert_eq!(*f.recorder.0.lock(), vec![7]);
            assert_eq!(report.processed, 1);
        });
    }

    #[test]
    fn malformed_batch_is_skipped_and_cursor_advances() {
        block_on(async {
            let capture = LogCapture::new();
            let _guard = tracing::subscriber::set_default(capture.subscriber());
            let f = fixture();
            f.store.append("node-a", String::from("{ not json"), 1).await.expect("append");
            let last = append(&f.store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 3)]).await;

            let report = f.processor.sync().await.expect("sync");

            assert_eq!(report.malformed, 1);
            assert_eq!(report.processed, 1);
            assert_eq!(report.last_id, last);
            capture.assert_contains("instruction.malformed");
        });
    }

    #[test]
    fn failed_batch_is_logged_and_skipped() {
        block_on(async {
            let capture = LogCapture::new();
            let _guard = tracing::subscriber::set_default(capture.subscriber());
            let f = fixture();
            append(&f.store, "node-a", vec![RefreshInstruction::refresh_all(Uuid::from_u128(0xbad))]).await;
            let last = append(&f.store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 4)]).await;

            let report = f.processor.sync().await.expect("sync");

            assert_eq!(report.failed, 1);
            assert_eq!(*f.recorder.0.lock(), vec![4]);
            assert_eq!(f.processor.last_synced_id(), Some(last));
            capture.assert_contains("distributed cache is not updated");
        });
    }

    #[test]
    fn fetch_limit_bounds_one_sync() {
        block_on(async {
            let store = InMemoryInstructionStore::new(Clock::new_frozen());
            let recorder = Recorder::default();
            let registry = CacheRefresherRegistry::builder()
                .register(RefresherEntry::new(recorder.clone()).by_id())
                .build()
                .expect("registry");
            let options = InstructionProcessorOptions {
                fetch_limit: 2,
                ..InstructionProcessorOptions::default()
            };
            let processor =
                InstructionProcessor::new(store.clone(), Arc::new(registry), "node-b", options, Clock::new_frozen())
                    .with_last_synced_id(0);
            for id in 1..=3 {
                append(&store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, id)]).await;
            }

            assert_eq!(processor.sync().await.expect("first").processed, 2);
            assert_eq!(processor.sync().await.expect("second").processed, 1);
            assert_eq!(*recorder.0.lock(), vec![1, 2, 3]);
        });
    }

    #[test]
    fn never_synced_processor_cold_boots() {
        block_on(async {
            let store = InMemoryInstructionStore::new(Clock::new_frozen());
            let last = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            let processor = bare_processor(store, InstructionProcessorOptions::default(), Clock::new_frozen());

            assert_eq!(processor.last_synced_id(), None);
            assert_eq!(processor.initialize().await.expect("initialize"), StartupMode::ColdBoot);
            assert_eq!(processor.last_synced_id(), Some(last));
            assert_eq!(processor.sync().await.expect("sync").processed, 0);
        });
    }

    #[test]
    fn far_behind_processor_cold_boots_and_close_one_resumes() {
        block_on(async {
            let f = fixture();
            let first = append(&f.store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 1)]).await;
            let close = bare_processor(f.store.clone(), InstructionProcessorOptions::default(), Clock::new_frozen())
                .with_last_synced_id(first);
            append(&f.store, "node-a", vec![RefreshInstruction::refresh_by_id(Recorder::UNIQUE_ID, 2)]).await;
            assert_eq!(close.initialize().await.expect("resume"), StartupMode::Resume);
            assert_eq!(close.last_synced_id(), Some(first));

            let options = InstructionProcessorOptions {
                max_processing_instructions: 2,
                ..InstructionProcessorOptions::default()
            };
            let ids = RefreshInstruction::refresh_ids(Recorder::UNIQUE_ID, &[1, 2, 3]).expect("ids");
            let last = append(&f.store, "node-a", vec![ids]).await;
            let behind = bare_processor(f.store.clone(), options, Clock::new_frozen()).with_last_synced_id(first);

            assert_eq!(behind.initialize().await.expect("cold boot"), StartupMode::ColdBoot);
            assert_eq!(behind.last_synced_id(), Some(last));
        });
    }

    fn bare_processor(
        store: InMemoryInstructionStore,
        options: InstructionProcessorOptions,
        clock: Clock,
    ) -> InstructionProcessor<InMemoryInstructionStore> {
        let registry = Arc::new(CacheRefresherRegistry::builder().build().expect("registry"));
        InstructionProcessor::new(store, registry, "node-b", options, clock)
    }

    #[test]
    fn zero_cursor_resumes_only_on_an_empty_store() {
        block_on(async {
            let f = fixture();
            assert_eq!(f.processor.initialize().await.expect("fresh"), StartupMode::Resume);
            assert_eq!(f.processor.last_synced_id(), Some(0));

            let last = append(&f.store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            let late = bare_processor(f.store.clone(), InstructionProcessorOptions::default(), Clock::new_frozen())
                .with_last_synced_id(0);

            assert_eq!(late.initialize().await.expect("cold boot"), StartupMode::ColdBoot);
            assert_eq!(late.last_synced_id(), Some(last));
        });
    }

    #[test]
    fn cursor_pointing_at_a_pruned_batch_cold_boots() {
        block_on(async {
            let capture = LogCapture::new();
            let _guard = tracing::subscriber::set_default(capture.subscriber());
            let control = ClockControl::new();
            let store = InMemoryInstructionStore::new(control.to_clock());
            let stale = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            control.advance(Duration::from_secs(3600));
            let cutoff = control.to_clock().system_time();
            let last = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            store.prune(cutoff, last).await.expect("prune");

            let processor = bare_processor(store, InstructionProcessorOptions::default(), control.to_clock())
                .with_last_synced_id(stale);

            assert_eq!(processor.initialize().await.expect("cold boot"), StartupMode::ColdBoot);
            assert_eq!(processor.last_synced_id(), Some(last));
            capture.assert_contains("instruction.cursor_missing");
        });
    }

    #[test]
    fn cursor_is_read_at_startup_and_saved_as_it_moves() {
        block_on(async {
            let store = InMemoryInstructionStore::new(Clock::new_frozen());
            let first = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            let cursor = InMemorySyncCursor::new();
            cursor.save(first).await.expect("save");

            let processor = bare_processor(store.clone(), InstructionProcessorOptions::default(), Clock::new_frozen())
                .with_cursor_store(Arc::new(cursor.clone()));
            assert_eq!(processor.initialize().await.expect("resume"), StartupMode::Resume);
            assert_eq!(processor.last_synced_id(), Some(first));

            let next = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            processor.sync().await.expect("sync");
            assert_eq!(cursor.get(), Some(next));
        });
    }

    #[test]
    fn cold_boot_saves_the_cursor() {
        block_on(async {
            let store = InMemoryInstructionStore::new(Clock::new_frozen());
            let last = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Recorder::UNIQUE_ID)]).await;
            let cursor = InMemorySyncCursor::new();
            let processor = bare_processor(store, InstructionProcessorOptions::default(), Clock::new_frozen())
                .with_cursor_store(Arc::new(cursor.clone()));

            assert_eq!(processor.initialize().await.expect("cold boot"), StartupMode::ColdBoot);
            assert_eq!(cursor.get(), Some(last));
        });
    }

    #[test]
    fn syncs_inside_the_throttle_window_do_nothing() {
        block_on(async {
            let control = ClockControl::new();
            let store = InMemoryInstructionStore::new(control.to_clock());
            let options = InstructionProcessorOptions {
                sync_throttle: Duration::from_secs(5),
                ..InstructionProcessorOptions::default()
            };
            let processor = bare_processor(store.clone(), options, control.to_clock()).with_last_synced_id(0);
            let last = append(&store, "node-a", vec![RefreshInstruction::refresh_all(Uuid::from_u128(0xbad))]).await;

            let early = processor.sync().await.expect("early");
            assert_eq!(early, SyncReport { throttled: true, ..SyncReport::default() });

            control.advance(Duration::from_secs(5));
            let due = processor.sync().await.expect("due");
            assert!(!due.throttled);
            assert_eq!(due.last_id, last);

            control.advance(Duration::from_secs(1));
            assert!(processor.sync().await.expect("again").throttled);
        });
    }

    #[test]
    fn old_batches_are_pruned_when_due() {
        block_on(async {
            let control = ClockControl::new();
            let store = InMemoryInstructionStore::new(control.to_clock());
            let options = InstructionProcessorOptions {
                prune_throttle: Duration::from_secs(60),
                retain_instructions: Duration::from_secs(600),
                ..InstructionProcessorOptions::default()
            };
            let processor = bare_processor(store.clone(), options, control.to_clock()).with_last_synced_id(0);
            for _ in 0..3 {
                append(&store, "node-a", vec![RefreshInstruction::refresh_all(Uuid::from_u128(0xbad))]).await;
            }

            control.advance(Duration::from_secs(30));
            assert_eq!(processor.sync().await.expect("not due").pruned, 0);

            control.advance(Duration::from_secs(600));
            let report = processor.sync().await.expect("due");
            assert_eq!(report.pruned, 2);
            assert_eq!(store.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);

            assert_eq!(processor.sync().await.expect("throttled prune").pruned, 0);
        });
    }

    #[test]
    fn pruning_can_be_left_to_another_server() {
        block_on(async {
            let control = ClockControl::new();
            let store = InMemoryInstructionStore::new(control.to_clock());
            let options = InstructionProcessorOptions {
                prune: false,
                retain_instructions: Duration::from_secs(1),
                ..InstructionProcessorOptions::default()
            };
            let processor = bare_processor(store.clone(), options, control.to_clock()).with_last_synced_id(0);
            for _ in 0..3 {
                append(&store, "node-a", vec![RefreshInstruction::refresh_all(Uuid::from_u128(0xbad))]).await;
            }

            control.advance(Duration::from_secs(3600));
            assert_eq!(processor.sync().await.expect("sync").pruned, 0);
            assert_eq!(store.len(), 3);
        });
    }
}
