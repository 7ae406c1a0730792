// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::AppCache;

/// Evicts keys when dropped, whether the guarded write finished, failed or was cancelled.
pub(crate) struct EvictOnDrop<'a> {
    cache: &'a dyn AppCache,
    keys: Vec<String>,
}

impl<'a> EvictOnDrop<'a> {
    pub(crate) fn new(cache: &'a dyn AppCache, keys: Vec<String>) -> Self {
        Self { cache, keys }
    }
}

impl Drop for EvictOnDrop<'_> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.cache.clear_key(key);
        }
    }
}
