// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock store implementation for testing.
//!
//! This module provides `MockStore`, an in-memory [`EntityStore`] that records every operation and supports
//! failure injection for testing how policies react to a store that rejects a read or a write.

use std::fmt;
use std::sync::Arc;

use cohere_cache::{Error, Result};
use parking_lot::Mutex;

use crate::{CachedEntity, EntityStore};

/// Recorded store operation. Identifiers are kept in their display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// One entity was loaded.
    LoadOne(String),
    /// Entities were loaded; an empty list means every entity.
    LoadMany(Vec<String>),
    /// An existence check was performed.
    Exists(String),
    /// The entities were counted.
    Count,
    /// An entity was created or updated.
    Persist(String),
    /// An entity was deleted.
    Delete(String),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable mock store for testing.
///
/// # Failure Injection
///
/// ```
/// use cohere_cache::EntityKind;
/// use cohere_repository::testing::{MockStore, StoreOp};
/// use cohere_repository::{CachedEntity, EntityStore};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Domain {
///     id: i32,
/// }
///
/// impl CachedEntity for Domain {
///     const KIND: EntityKind = EntityKind::Domain;
///     type Id = i32;
///
///     fn id(&self) -> i32 {
///         self.id
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let store = MockStore::with_entities([Domain { id: 1 }]);
/// store.fail_when(|op| matches!(op, StoreOp::LoadOne(id) if id == "1"));
///
/// assert!(matches!(store.load_one(&1).await, Err(_)));
/// assert_eq!(store.operations(), vec![StoreOp::LoadOne("1".into())]);
/// # });
/// ```
pub struct MockStore<E> {
    entities: Arc<Mutex<Vec<E>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl<E: fmt::Debug> fmt::Debug for MockStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStore")
            .field("entities", &self.entities)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl<E> Clone for MockStore<E> {
    fn clone(&self) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<E> Default for MockStore<E> {
    fn default() -> Self {
        Self {
            entities: Arc::new(Mutex::new(Vec::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }
}

impl<E: CachedEntity> MockStore<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `entities`.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let store = Self::new();
        store.entities.lock().extend(entities);
        store
    }

    /// Sets a predicate deciding which operations fail with a persistence error.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns every recorded operation.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Returns how many recorded operations match `predicate`.
    #[must_use]
    pub fn count_of(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Forgets every recorded operation.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns a copy of the stored entities.
    #[must_use]
    pub fn entities(&self) -> Vec<E> {
        self.entities.lock().clone()
    }

    /// Creates or replaces `entity` and hands it back.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the failure predicate matches.
    pub async fn persist(&self, entity: E) -> Result<E> {
        self.record(StoreOp::Persist(entity.id().to_string()))?;

        let mut entities = self.entities.lock();
        match entities.iter_mut().find(|e| e.id() == entity.id()) {
            Some(existing) => *existing = entity.clone(),
            None => entities.push(entity.clone()),
        }
        Ok(entity)
    }

    /// Deletes `entity`. Deleting a missing entity succeeds.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the failure predicate matches.
    pub async fn delete(&self, entity: E) -> Result<()> {
        self.record(StoreOp::Delete(entity.id().to_string()))?;
        self.entities.lock().retain(|e| e.id() != entity.id());
        Ok(())
    }

    fn record(&self, op: StoreOp) -> Result<()> {
        let fails = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let message = format!("injected failure on {op:?}");
        self.operations.lock().push(op);

        if fails { Err(Error::persistence(message)) } else { Ok(()) }
    }
}

impl<E: CachedEntity> EntityStore<E> for MockStore<E> {
    async fn load_one(&self, id: &E::Id) -> Result<Option<E>> {
        self.record(StoreOp::LoadOne(id.to_string()))?;
        Ok(self.entities.lock().iter().find(|e| &e.id() == id).cloned())
    }

    async fn load_many(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        self.record(StoreOp::LoadMany(ids.iter().map(ToString::to_string).collect()))?;

        let entities = self.entities.lock();
        if ids.is_empty() {
            return Ok(entities.clone());
        }
        Ok(ids.iter().filter_map(|id| entities.iter().find(|e| &e.id() == id).cloned()).collect())
    }

    async fn exists(&self, id: &E::Id) -> Result<bool> {
        self.record(StoreOp::Exists(id.to_string()))?;
        Ok(self.entities.lock().iter().any(|e| &e.id() == id))
    }

    async fn count(&self) -> Result<usize> {
        self.record(StoreOp::Count)?;
        Ok(self.entities.lock().len())
    }
}
