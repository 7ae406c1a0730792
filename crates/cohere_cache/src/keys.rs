// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache key conventions shared by repository policies and refreshers.

use std::fmt::Display;

use uuid::Uuid;

use crate::EntityKind;

/// Prefix of every key written by a repository cache policy.
pub const REPOSITORY_PREFIX: &str = "uRepo_";

/// Prefix of keys that address an entity by its secondary (UUID) key.
pub const REPOSITORY_KEY_PREFIX: &str = "uRepoGuid_";

/// Returns the prefix shared by every entity key of `kind`.
///
/// The bare prefix is itself a key: it holds the zero-count marker of the default policy and the whole
/// collection of the full-data-set policy.
#[must_use]
pub fn kind_prefix(kind: EntityKind) -> String {
    format!("{REPOSITORY_PREFIX}{kind}_")
}

/// Returns the key of a single entity of `kind`.
#[must_use]
pub fn entity_key(kind: EntityKind, id: impl Display) -> String {
    format!("{REPOSITORY_PREFIX}{kind}_{id}")
}

/// Returns the key of a single entity of `kind` addressed by its secondary key.
#[must_use]
pub fn entity_key_by_uuid(kind: EntityKind, key: Uuid) -> String {
    format!("{REPOSITORY_KEY_PREFIX}{kind}_{key}")
}
