// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The wire format of invalidation messages exchanged between servers.

use cohere_cache::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How a [`RefreshInstruction`] addresses what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefreshMethod {
    /// Evict everything the refresher is responsible for.
    RefreshAll,
    /// Evict the entity whose secondary key is `guid_id`.
    RefreshByGuid,
    /// Evict the entity whose id is `int_id`.
    RefreshById,
    /// Evict every entity whose id is listed in `json_ids`.
    RefreshByIds,
    /// Apply the change descriptions serialized in `json_payload`.
    RefreshByJson,
    /// Evict the removed entity whose id is `int_id`.
    RemoveById,
}

/// One invalidation message addressed to a refresher.
///
/// # Example
///
/// ```
/// use cohere_sync::{RefreshInstruction, RefreshMethod};
/// use uuid::Uuid;
///
/// let refresher = Uuid::from_u128(7);
/// let instruction = RefreshInstruction::refresh_ids(refresher, &[1, 2, 3])?;
///
/// assert_eq!(instruction.method, RefreshMethod::RefreshByIds);
/// assert_eq!(instruction.json_ids.as_deref(), Some("[1,2,3]"));
/// assert_eq!(instruction.json_id_count, 3);
/// # Ok::<(), cohere_cache::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshInstruction {
    /// The refresher the instruction is addressed to.
    pub refresher_id: Uuid,
    /// How the instruction addresses what changed.
    pub method: RefreshMethod,
    /// Secondary key, for [`RefreshMethod::RefreshByGuid`].
    #[serde(default)]
    pub guid_id: Uuid,
    /// Numeric id, for [`RefreshMethod::RefreshById`] and [`RefreshMethod::RemoveById`].
    #[serde(default)]
    pub int_id: i32,
    /// JSON array of ids, for [`RefreshMethod::RefreshByIds`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_ids: Option<String>,
    /// JSON array of change descriptions, for [`RefreshMethod::RefreshByJson`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_payload: Option<String>,
    /// Number of invalidations the instruction stands for.
    #[serde(default = "one")]
    pub json_id_count: usize,
}

const fn one() -> usize {
    1
}

impl RefreshInstruction {
    fn new(refresher_id: Uuid, method: RefreshMethod) -> Self {
        Self {
            refresher_id,
            method,
            guid_id: Uuid::nil(),
            int_id: 0,
            json_ids: None,
            json_payload: None,
            json_id_count: 1,
        }
    }

    /// Evicts everything the refresher is responsible for.
    #[must_use]
    pub fn refresh_all(refresher_id: Uuid) -> Self {
        Self::new(refresher_id, RefreshMethod::RefreshAll)
    }

    /// Evicts the entity with secondary key `key`.
    #[must_use]
    pub fn refresh_by_guid(refresher_id: Uuid, key: Uuid) -> Self {
        Self {
            guid_id: key,
            ..Self::new(refresher_id, RefreshMethod::RefreshByGuid)
        }
    }

    /// Evicts the entity `id`.
    #[must_use]
    pub fn refresh_by_id(refresher_id: Uuid, id: i32) -> Self {
        Self {
            int_id: id,
            ..Self::new(refresher_id, RefreshMethod::RefreshById)
        }
    }

    /// Evicts the removed entity `id`.
    #[must_use]
    pub fn remove_by_id(refresher_id: Uuid, id: i32) -> Self {
        Self {
            int_id: id,
            ..Self::new(refresher_id, RefreshMethod::RemoveById)
        }
    }

    /// Evicts every entity in `ids` with a single instruction.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the ids cannot be serialized.
    pub fn refresh_ids(refresher_id: Uuid, ids: &[i32]) -> Result<Self> {
        Ok(Self {
            json_ids: Some(serde_json::to_string(ids).map_err(Error::serialization)?),
            json_id_count: ids.len().max(1),
            ..Self::new(refresher_id, RefreshMethod::RefreshByIds)
        })
    }

    /// Applies `count` change descriptions serialized as the JSON array `json`.
    #[must_use]
    pub fn refresh_by_json(refresher_id: Uuid, json: String, count: usize) -> Self {
        Self {
            json_payload: Some(json),
            json_id_count: count.max(1),
            ..Self::new(refresher_id, RefreshMethod::RefreshByJson)
        }
    }
}

/// Instructions queued together by one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionBatch {
    /// Identity of the server that queued the batch.
    pub origin: String,
    /// The instructions, in the order they were queued.
    pub instructions: Vec<RefreshInstruction>,
}

impl InstructionBatch {
    /// Creates a batch queued by `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>, instructions: Vec<RefreshInstruction>) -> Self {
        Self {
            origin: origin.into(),
            instructions,
        }
    }

    /// Returns the number of invalidations the batch stands for.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.iter().map(|i| i.json_id_count).sum()
    }

    /// Serializes the instructions as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if an instruction cannot be serialized.
    pub fn instructions_json(&self) -> Result<String> {
        serde_json::to_string(&self.instructions).map_err(Error::serialization)
    }
}

/// Parses serialized instructions, flattening nested arrays.
///
/// # Errors
///
/// Returns a serialization error if `json` is not valid JSON or contains anything other than instruction
/// objects and arrays of them.
///
/// # Example
///
/// ```
/// use cohere_sync::expand_instructions;
///
/// let json = r#"[[{"refresherId":"00000000-0000-0000-0000-000000000007","method":"RefreshAll"}]]"#;
/// let instructions = expand_instructions(json)?;
///
/// assert_eq!(instructions.len(), 1);
/// # Ok::<(), cohere_cache::Error>(())
/// ```
pub fn expand_instructions(json: &str) -> Result<Vec<RefreshInstruction>> {
    let value: Value = serde_json::from_str(json).map_err(Error::serialization)?;
    let mut instructions = Vec::new();
    flatten(value, &mut instructions)?;
    Ok(instructions)
}

fn flatten(value: Value, into: &mut Vec<RefreshInstruction>) -> Result<()> {
    match value {
        Value::Array(items) => items.into_iter().try_for_each(|item| flatten(item, into)),
        object @ Value::Object(_) => {
            into.push(serde_json::from_value(object).map_err(Error::serialization)?);
            Ok(())
        }
        other => Err(Error::serialization(format!("expected a refresh instruction, found {other}"))),
    }
}
