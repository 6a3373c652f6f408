//! Type-identified attribute bags.
//!
//! Balancers and resolvers attach private data to subchannels and resolved
//! addresses without colliding: a [`Key`] is identified by the instance,
//! not its debug name, and is bound to one value type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(0);

/// A typed attribute key. Two keys created with the same debug name are
/// still distinct.
pub struct Key<T> {
    id: u64,
    debug_name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub fn new(debug_name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            debug_name,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.debug_name)
    }
}

/// An immutable bag of typed attributes. Cloning is cheap (values are
/// shared).
#[derive(Clone, Default)]
pub struct Attributes {
    entries: HashMap<u64, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this bag with the value set for the key.
    pub fn with<T: Send + Sync + 'static>(mut self, key: &Key<T>, value: T) -> Self {
        self.entries
            .insert(key.id, (key.debug_name, Arc::new(value)));
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<&T> {
        self.entries
            .get(&key.id)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    pub fn contains<T>(&self, key: &Key<T>) -> bool {
        self.entries.contains_key(&key.id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_tuple("Attributes").field(&names).finish()
    }
}
