//! Memoizing caches with per-entry dirty tracking.
//!
//! Used for every per-context GPU resource table (shaders, programs, buffers,
//! textures). There is no eviction: entries live as long as the registry.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

/// A cached value plus a "needs GPU sync" flag.
///
/// `dirty` starts `true`; the consumer clears it once GPU state matches.
#[derive(Debug)]
pub struct Record<V> {
    value: V,
    dirty: Cell<bool>,
}

impl<V> Record<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            dirty: Cell::new(true),
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn clear_dirty(&self) {
        self.dirty.set(false);
    }
}

pub struct Registry<K, V> {
    entries: RefCell<HashMap<K, Rc<Record<V>>>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }
}

impl<K, V> fmt::Debug for Registry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.borrow().len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V> Registry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, running `init` only the first time.
    pub fn register(&self, key: K, init: impl FnOnce() -> V) -> Rc<Record<V>> {
        match self.try_register(key, || Ok::<V, Infallible>(init())) {
            Ok(record) => record,
            Err(never) => match never {},
        }
    }

    /// Fallible [`Registry::register`]; nothing is cached when `init` fails.
    ///
    /// `init` runs without the registry borrowed, so it may register other keys.
    pub fn try_register<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<Rc<Record<V>>, E> {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }
        let value = init()?;
        let mut entries = self.entries.borrow_mut();
        let record = entries
            .entry(key)
            .or_insert_with(|| Rc::new(Record::new(value)));
        Ok(Rc::clone(record))
    }

    pub fn get(&self, key: &K) -> Option<Rc<Record<V>>> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Returns `false` if nothing is registered under `key`.
    pub fn mark_dirty(&self, key: &K) -> bool {
        match self.entries.borrow().get(key) {
            Some(record) => {
                record.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn values(&self) -> Vec<Rc<Record<V>>> {
        self.entries.borrow().values().cloned().collect()
    }

    /// Empties the registry, handing back every record (used for GPU teardown).
    pub fn drain(&self) -> Vec<(K, Rc<Record<V>>)> {
        self.entries.borrow_mut().drain().collect()
    }
}
