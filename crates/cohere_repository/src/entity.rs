// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! How entities are stored in a cache surface.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use cohere_cache::{CacheValue, EntityKind};

/// An entity that a repository cache policy can cache.
///
/// Entities own their data, so [`Clone`] is a deep copy: a clone never shares mutable state with the
/// original.
///
/// # Example
///
/// ```
/// use cohere_cache::EntityKind;
/// use cohere_repository::CachedEntity;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Template {
///     id: i32,
///     alias: String,
/// }
///
/// impl CachedEntity for Template {
///     const KIND: EntityKind = EntityKind::Template;
///     type Id = i32;
///
///     fn id(&self) -> i32 {
///         self.id
///     }
///
///     fn has_identity(&self) -> bool {
///         self.id != 0
///     }
/// }
/// ```
pub trait CachedEntity: Clone + Debug + Send + Sync + 'static {
    /// The kind whose isolated cache holds this entity.
    const KIND: EntityKind;

    /// The identifier used in cache keys.
    type Id: Clone + Eq + Hash + Display + Debug + Send + Sync + 'static;

    /// Returns the identifier of this entity.
    fn id(&self) -> Self::Id;

    /// Returns `true` once the store assigned an identity to this entity.
    fn has_identity(&self) -> bool {
        true
    }

    /// Returns the runtime kind of this entity when it differs from [`Self::KIND`].
    fn kind(&self) -> EntityKind {
        Self::KIND
    }

    /// Returns the comma-separated ancestor path of a tree-structured entity.
    fn tree_path(&self) -> Option<&str> {
        None
    }

    /// Clears change tracking.
    fn reset_dirty_properties(&mut self) {}
}

/// A single entity as stored in a cache surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntityValue<E>(E);

impl<E: CachedEntity> CachedEntityValue<E> {
    /// Wraps `entity` for storage.
    #[must_use]
    pub fn new(entity: E) -> Self {
        Self(entity)
    }

    /// Borrows the entity.
    #[must_use]
    pub fn entity(&self) -> &E {
        &self.0
    }

    /// Takes the entity out of a shared value, cloning it only if the value is still shared.
    #[must_use]
    pub fn take(value: Arc<Self>) -> E {
        Arc::try_unwrap(value).map_or_else(|shared| shared.0.clone(), |owned| owned.0)
    }
}

impl<E: CachedEntity> CacheValue for CachedEntityValue<E> {
    fn entity_kind(&self) -> Option<EntityKind> {
        Some(self.0.kind())
    }

    fn tree_path(&self) -> Option<&str> {
        self.0.tree_path()
    }

    fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
        Some(Box::new(self.clone()))
    }

    fn reset_dirty_properties(&mut self) {
        self.0.reset_dirty_properties();
    }
}

/// A whole collection of entities stored under one key.
///
/// Copying the list shares its items; each item is cloned only when it is handed out. A list is therefore
/// deep-copied once, when it is built, however many times a cloning surface copies it afterwards.
#[derive(Debug)]
pub struct EntityList<E> {
    items: Arc<[E]>,
}

impl<E> Clone for EntityList<E> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<E: CachedEntity> EntityList<E> {
    /// Builds a list owning `items`.
    #[must_use]
    pub fn new(items: Vec<E>) -> Self {
        Self { items: items.into() }
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns a private copy of every entity.
    #[must_use]
    pub fn to_vec(&self) -> Vec<E> {
        self.items.to_vec()
    }

    /// Returns a private copy of the entity with identifier `id`.
    #[must_use]
    pub fn find(&self, id: &E::Id) -> Option<E> {
        self.items.iter().find(|e| &e.id() == id).cloned()
    }
}

impl<E: CachedEntity> CacheValue for EntityList<E> {
    fn entity_kind(&self) -> Option<EntityKind> {
        Some(E::KIND)
    }

    fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
        Some(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        id: i32,
        path: String,
        dirty: bool,
    }

    impl CachedEntity for Node {
        const KIND: EntityKind = EntityKind::Content;
        type Id = i32;

        fn id(&self) -> i32 {
            self.id
        }

        fn tree_path(&self) -> Option<&str> {
            Some(&self.path)
        }

        fn reset_dirty_properties(&mut self) {
            self.dirty = false;
        }
    }

    fn node(id: i32) -> Node {
        Node {
            id,
            path: format!("-1,{id}"),
            dirty: true,
        }
    }

    #[test]
    fn value_exposes_entity_capabilities() {
        let mut value = CachedEntityValue::new(node(3));
        assert_eq!(value.entity_kind(), Some(EntityKind::Content));
        assert_eq!(CacheValue::tree_path(&value), Some("-1,3"));

        value.reset_dirty_properties();
        assert!(!value.entity().dirty);
    }

    #[test]
    fn take_avoids_clone_when_unique() {
        let value = Arc::new(CachedEntityValue::new(node(1)));
        let shared = Arc::clone(&value);

        assert_eq!(CachedEntityValue::take(value).id, 1);
        assert_eq!(CachedEntityValue::take(shared).id, 1);
    }

    #[test]
    fn list_copies_share_items() {
        let list = EntityList::new(vec![node(1), node(2)]);
        let copy = list.deep_clone().expect("lists clone");
        let copy = copy.downcast_ref::<EntityList<Node>>().expect("same type");

        assert!(Arc::ptr_eq(&list.items, &copy.items));
        assert_eq!(copy.find(&2).map(|n| n.id), Some(2));
        assert!(copy.find(&9).is_none());
        assert_eq!(list.to_vec().len(), 2);
    }
}
