//! LRU assignment of a fixed number of texture units.
//!
//! Requests for keys that already own a unit are answered immediately.
//! Everything else is queued and resolved in one batch per draw, so several
//! samplers asking for the same texture in one draw share a single slot.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub enum Enqueued<C> {
    /// `key` already owns `unit`; run the continuation now.
    Ready(u32, C),
    /// Held until [`TextureSlots::resolve`].
    Queued,
}

#[derive(Debug)]
pub struct TextureSlots<K, C> {
    capacity: u32,
    next_unit: u32,
    freed: Vec<u32>,
    assigned: HashMap<K, u32>,
    /// Least recently touched at the front.
    lru: VecDeque<K>,
    pending: Vec<(K, Vec<C>)>,
    pending_index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, C> TextureSlots<K, C> {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity.max(1),
            next_unit: 0,
            freed: Vec::new(),
            assigned: HashMap::new(),
            lru: VecDeque::new(),
            pending: Vec::new(),
            pending_index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn unit_of(&self, key: &K) -> Option<u32> {
        self.assigned.get(key).copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn enqueue(&mut self, key: K, continuation: C) -> Enqueued<C> {
        if let Some(&unit) = self.assigned.get(&key) {
            self.touch(&key);
            return Enqueued::Ready(unit, continuation);
        }
        match self.pending_index.get(&key) {
            Some(&i) => self.pending[i].1.push(continuation),
            None => {
                self.pending_index.insert(key.clone(), self.pending.len());
                self.pending.push((key, vec![continuation]));
            }
        }
        Enqueued::Queued
    }

    /// Assign units to everything queued, in request order, evicting the least
    /// recently used keys once every unit is taken.
    pub fn resolve(&mut self) -> Vec<(u32, Vec<C>)> {
        self.pending_index.clear();
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(key, continuations)| (self.assign(key), continuations))
            .collect()
    }

    /// Give `key`'s unit back, e.g. when its texture is destroyed.
    pub fn release(&mut self, key: &K) -> Option<u32> {
        let unit = self.assigned.remove(key)?;
        self.lru.retain(|k| k != key);
        self.freed.push(unit);
        Some(unit)
    }

    fn assign(&mut self, key: K) -> u32 {
        if let Some(&unit) = self.assigned.get(&key) {
            self.touch(&key);
            return unit;
        }
        let unit = if let Some(unit) = self.freed.pop() {
            unit
        } else if self.next_unit < self.capacity {
            let unit = self.next_unit;
            self.next_unit += 1;
            unit
        } else {
            // Every unit is assigned, so the LRU deque is non-empty.
            let evicted = self.lru.pop_front();
            evicted
                .and_then(|k| self.assigned.remove(&k))
                .unwrap_or(0)
        };
        self.assigned.insert(key.clone(), unit);
        self.lru.push_back(key);
        unit
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            if let Some(k) = self.lru.remove(pos) {
                self.lru.push_back(k);
            }
        }
    }
}
