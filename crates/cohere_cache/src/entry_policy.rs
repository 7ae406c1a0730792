// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Expiration rules for one cache entry.
///
/// An entry without a timeout and without dependent files lives until it is evicted.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use cohere_cache::EntryPolicy;
///
/// let policy = EntryPolicy::sliding(Duration::from_secs(300));
/// assert!(policy.is_sliding());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPolicy {
    timeout: Option<Duration>,
    sliding: bool,
    dependent_files: Vec<PathBuf>,
}

impl EntryPolicy {
    /// An entry that never expires on its own.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            timeout: None,
            sliding: false,
            dependent_files: Vec::new(),
        }
    }

    /// An entry that expires `timeout` after it was stored.
    #[must_use]
    pub const fn absolute(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            sliding: false,
            dependent_files: Vec::new(),
        }
    }

    /// An entry that expires once it has not been read for `timeout`.
    #[must_use]
    pub const fn sliding(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            sliding: true,
            dependent_files: Vec::new(),
        }
    }

    /// Builds a policy from an optional timeout and a sliding flag.
    #[must_use]
    pub const fn new(timeout: Option<Duration>, sliding: bool) -> Self {
        Self {
            timeout,
            sliding,
            dependent_files: Vec::new(),
        }
    }

    /// Expires the entry when the file at `path` changes.
    #[must_use]
    pub fn with_dependent_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dependent_files.push(path.into());
        self
    }

    /// Returns the timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns `true` if reads renew the timeout.
    #[must_use]
    pub fn is_sliding(&self) -> bool {
        self.sliding
    }

    /// Returns the files the entry depends on.
    #[must_use]
    pub fn dependent_files(&self) -> &[PathBuf] {
        &self.dependent_files
    }
}

#[derive(Debug)]
struct FileStamp {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn capture(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: modified_at(path),
        }
    }

    fn changed(&self) -> bool {
        modified_at(&self.path) != self.modified
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Expiration state of a stored entry.
#[derive(Debug)]
pub(crate) struct Expiration {
    stored_at: Instant,
    last_access: Mutex<Instant>,
    timeout: Option<Duration>,
    sliding: bool,
    files: Vec<FileStamp>,
}

impl Expiration {
    pub(crate) fn start(policy: &EntryPolicy, now: Instant) -> Self {
        Self {
            stored_at: now,
            last_access: Mutex::new(now),
            timeout: policy.timeout,
            sliding: policy.sliding,
            files: policy.dependent_files.iter().map(|p| FileStamp::capture(p)).collect(),
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        if let Some(timeout) = self.timeout {
            let since = if self.sliding { *self.last_access.lock() } else { self.stored_at };
            if now.saturating_duration_since(since) >= timeout {
                return true;
            }
        }

        self.files.iter().any(FileStamp::changed)
    }

    pub(crate) fn touch(&self, now: Instant) {
        if self.sliding {
            let mut last = self.last_access.lock();
            if now > *last {
                *last = now;
            }
        }
    }
}
