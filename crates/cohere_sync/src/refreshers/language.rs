// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use cohere_cache::{AppCaches, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clear_kind;
use crate::refresher::{CacheRefresher, PayloadCacheRefresher};

/// How a language changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageChangeType {
    /// A property other than the culture changed.
    Update,
    /// The language was removed.
    Remove,
    /// The culture of the language changed.
    ChangeCulture,
}

/// Describes a change to one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePayload {
    /// The id of the changed language.
    pub id: i32,
    /// The culture code of the language, such as `en-US`.
    pub iso_code: String,
    /// How the language changed.
    pub change_type: LanguageChangeType,
}

/// Evicts cached languages.
///
/// Content variants and domains are keyed by culture, so removing a language or changing its culture
/// evicts them as well.
#[derive(Debug, Clone)]
pub struct LanguageCacheRefresher {
    caches: AppCaches,
}

impl LanguageCacheRefresher {
    /// Creates a refresher evicting from `caches`.
    #[must_use]
    pub fn new(caches: AppCaches) -> Self {
        Self { caches }
    }
}

impl CacheRefresher for LanguageCacheRefresher {
    const UNIQUE_ID: Uuid = Uuid::from_u128(0x3e0f_95d8_0be5_44b8_8394_2b87_50b6_2654);
    const NAME: &'static str = "Language cache refresher";
    const KIND: EntityKind = EntityKind::Language;

    fn refresh_all(&self) {
        clear_kind(&self.caches, EntityKind::Language);
        clear_kind(&self.caches, EntityKind::Domain);
        clear_kind(&self.caches, EntityKind::Content);
    }
}

impl PayloadCacheRefresher for LanguageCacheRefresher {
    type Payload = LanguagePayload;

    fn refresh_payloads(&self, payloads: &[LanguagePayload]) {
        if payloads.is_empty() {
            return;
        }

        clear_kind(&self.caches, EntityKind::Language);

        let cultures_changed = payloads
            .iter()
            .any(|p| matches!(p.change_type, LanguageChangeType::Remove | LanguageChangeType::ChangeCulture));
        if cultures_changed {
            clear_kind(&self.caches, EntityKind::Content);
            clear_kind(&self.caches, EntityKind::Domain);
        }
    }
}
