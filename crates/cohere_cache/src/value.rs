// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::EntityKind;

/// Type-erasure helpers implemented for every sized cache value.
pub trait AsAny: Any + Send + Sync {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared value into a shared [`Any`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A value that can live in a cache surface.
///
/// Every capability is optional. A value reports its entity kind so that kind-based eviction can find it,
/// may expose a tree path for subtree eviction, may produce a deep copy for the cloning decorator and may
/// clear its dirty flags when it is materialized from the cache.
///
/// # Example
///
/// ```
/// use cohere_cache::{CacheValue, EntityKind};
///
/// #[derive(Debug, Clone)]
/// struct Template {
///     alias: String,
/// }
///
/// impl CacheValue for Template {
///     fn entity_kind(&self) -> Option<EntityKind> {
///         Some(EntityKind::Template)
///     }
///
///     fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
///         Some(Box::new(self.clone()))
///     }
/// }
/// ```
pub trait CacheValue: AsAny + Debug {
    /// Returns the runtime kind of this value, if it is an entity.
    fn entity_kind(&self) -> Option<EntityKind> {
        None
    }

    /// Returns the comma-separated ancestor path of a tree-structured entity.
    fn tree_path(&self) -> Option<&str> {
        None
    }

    /// Returns an independent copy of this value, if it supports deep copies.
    fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
        None
    }

    /// Clears change tracking so the value does not look modified.
    fn reset_dirty_properties(&mut self) {}
}

impl dyn CacheValue {
    /// Returns `true` if the value is a `T`.
    #[must_use]
    pub fn is<T: CacheValue>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrows the value as a `T`.
    #[must_use]
    pub fn downcast_ref<T: CacheValue>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Converts a shared cache value into a shared `T`.
#[must_use]
pub fn downcast_arc<T: CacheValue>(value: Arc<dyn CacheValue>) -> Option<Arc<T>> {
    value.into_any().downcast::<T>().ok()
}

/// Marks a cached absence of a string value.
///
/// Only string lookups see it, as `Some(None)`; every other typed lookup treats it as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullRepresentation;

impl CacheValue for NullRepresentation {}

macro_rules! plain_cache_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
                    Some(Box::new(self.clone()))
                }
            }
        )*
    };
}

plain_cache_value!(String, bool, i32, i64, u32, u64, usize);

impl<T: Clone + Debug + Send + Sync + 'static> CacheValue for Vec<T> {
    fn deep_clone(&self) -> Option<Box<dyn CacheValue>> {
        Some(Box::new(self.clone()))
    }
}
