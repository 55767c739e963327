//! Insertion-ordered callback lists with O(1) removal.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Listeners::insert`]; valid until the listener is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

/// Compaction only kicks in once there are at least this many holes.
const COMPACT_MIN_HOLES: usize = 16;

/// Ordered callbacks.
///
/// Removal leaves a hole that iteration skips; holes are compacted away once they
/// outnumber live entries, so the list never grows unbounded under churn.
pub struct Listeners<F: ?Sized> {
    slots: Vec<Option<(ListenerKey, Rc<F>)>>,
    index: HashMap<ListenerKey, usize>,
    next: u64,
    holes: usize,
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Listeners<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .field("holes", &self.holes)
            .finish()
    }
}

impl<F: ?Sized> Listeners<F> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            next: 0,
            holes: 0,
        }
    }

    pub fn insert(&mut self, callback: Rc<F>) -> ListenerKey {
        let key = ListenerKey(self.next);
        self.next += 1;
        self.index.insert(key, self.slots.len());
        self.slots.push(Some((key, callback)));
        key
    }

    /// Returns `false` if the key was already removed.
    pub fn remove(&mut self, key: ListenerKey) -> bool {
        let Some(slot) = self.index.remove(&key) else {
            return false;
        };
        self.slots[slot] = None;
        self.holes += 1;
        if self.holes >= COMPACT_MIN_HOLES && self.holes * 2 > self.slots.len() {
            self.compact();
        }
        true
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, entry) in self.slots.iter().enumerate() {
            if let Some((key, _)) = entry {
                self.index.insert(*key, slot);
            }
        }
        self.holes = 0;
    }

    pub fn contains(&self, key: ListenerKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Clones the live callbacks in insertion order.
    ///
    /// Callers invoke the snapshot after releasing their borrow, so callbacks may
    /// freely add or remove listeners on the same list.
    pub fn snapshot(&self) -> Vec<Rc<F>> {
        self.slots
            .iter()
            .flatten()
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }
}

/// Cancellation handle for a registered callback.
///
/// Dropping it leaves the callback registered; call [`Subscription::unsubscribe`]
/// to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
