// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistence of the last instruction batch a server handled.

use std::fmt::Debug;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cohere_cache::{Error, Result};
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;

/// Keeps the cursor of an [`InstructionProcessor`](crate::InstructionProcessor) across restarts.
///
/// The cursor is local to one server: it must not be shared with peers.
pub trait SyncCursorStore: Send + Sync + Debug {
    /// Returns the saved cursor, or `None` if this server never synced.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the cursor cannot be read.
    fn read(&self) -> BoxFuture<'_, Result<Option<u64>>>;

    /// Saves `last_synced_id` as the cursor.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the cursor cannot be written.
    fn save(&self, last_synced_id: u64) -> BoxFuture<'_, Result<()>>;
}

/// A [`SyncCursorStore`] that forgets the cursor when the process exits.
///
/// Clones share the cursor.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncCursor(Arc<Mutex<Option<u64>>>);

impl InMemorySyncCursor {
    /// Creates a store with no saved cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the saved cursor.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        *self.0.lock()
    }
}

impl SyncCursorStore for InMemorySyncCursor {
    fn read(&self) -> BoxFuture<'_, Result<Option<u64>>> {
        Box::pin(future::ready(Ok(self.get())))
    }

    fn save(&self, last_synced_id: u64) -> BoxFuture<'_, Result<()>> {
        *self.0.lock() = Some(last_synced_id);
        Box::pin(future::ready(Ok(())))
    }
}

/// A [`SyncCursorStore`] keeping the cursor as decimal text in a file.
///
/// A missing file reads as a server that never synced. So does a file whose content is not a number,
/// which is logged.
///
/// # Example
///
/// ```
/// use cohere_sync::{FileSyncCursor, SyncCursorStore};
///
/// # futures::executor::block_on(async {
/// let path = std::env::temp_dir().join(format!("cohere-doc-{}.txt", std::process::id()));
/// let cursor = FileSyncCursor::new(&path);
///
/// assert_eq!(cursor.read().await?, None);
/// cursor.save(42).await?;
/// assert_eq!(cursor.read().await?, Some(42));
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), cohere_cache::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct FileSyncCursor {
    path: PathBuf,
}

impl FileSyncCursor {
    /// Creates a store backed by the file at `path`. The file is created on the first save.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_now(&self) -> Result<Option<u64>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::persistence(error)),
        };

        match content.trim().parse() {
            Ok(id) => Ok(Some(id)),
            Err(error) => {
                tracing::warn!(cursor.path = %self.path.display(), error = %error, "cursor.unreadable");
                Ok(None)
            }
        }
    }
}

impl SyncCursorStore for FileSyncCursor {
    fn read(&self) -> BoxFuture<'_, Result<Option<u64>>> {
        Box::pin(future::ready(self.read_now()))
    }

    fn save(&self, last_synced_id: u64) -> BoxFuture<'_, Result<()>> {
        let written = std::fs::write(&self.path, last_synced_id.to_string()).map_err(Error::persistence);
        Box::pin(future::ready(written))
    }
}
