// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use cohere_cache::EntryPolicy;
use serde::{Deserialize, Serialize};

/// How long a cached entity lives by default.
pub const DEFAULT_ENTITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Options of the per-entity policies.
///
/// # Example
///
/// ```
/// use cohere_repository::RepositoryCachePolicyOptions;
///
/// let options: RepositoryCachePolicyOptions = serde_json::from_str(r#"{ "allow_zero_count": true }"#)?;
/// assert!(options.allow_zero_count);
/// assert!(options.validate_count);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryCachePolicyOptions {
    /// Checks a set of individually cached entities against the store count before trusting it as "all".
    pub validate_count: bool,
    /// Caches an empty "all" result so that repeated calls skip the store.
    pub allow_zero_count: bool,
    /// How long a cached entity lives.
    pub entity_timeout: Duration,
    /// Whether reads renew [`Self::entity_timeout`].
    pub sliding: bool,
}

impl Default for RepositoryCachePolicyOptions {
    fn default() -> Self {
        Self {
            validate_count: true,
            allow_zero_count: false,
            entity_timeout: DEFAULT_ENTITY_TIMEOUT,
            sliding: true,
        }
    }
}

impl RepositoryCachePolicyOptions {
    pub(crate) fn entry_policy(&self) -> EntryPolicy {
        EntryPolicy::new(Some(self.entity_timeout), self.sliding)
    }
}

/// Options of the full-data-set policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullDataSetOptions {
    /// Whether the cached set expires. A set that does not expire lives until a write clears it.
    pub expires: bool,
    /// How long the cached set lives when it expires.
    pub timeout: Duration,
}

impl Default for FullDataSetOptions {
    fn default() -> Self {
        Self {
            expires: true,
            timeout: DEFAULT_ENTITY_TIMEOUT,
        }
    }
}

impl FullDataSetOptions {
    pub(crate) fn entry_policy(&self) -> EntryPolicy {
        if self.expires {
            EntryPolicy::sliding(self.timeout)
        } else {
            EntryPolicy::none()
        }
    }
}
