use std::collections::VecDeque;

use crate::event::ListingKey;
use crate::fs::sort::SortSpec;

/// Default number of listing keys remembered per directory.
pub const DEFAULT_MAX_CACHED_LISTINGS: usize = 2;

/// Recently requested listing keys of one directory, least recent first.
///
/// Holding more than `capacity` keys evicts the least recently used one.
#[derive(Debug)]
pub struct ListingCache {
    slots: VecDeque<(ListingKey, SortSpec)>,
    capacity: usize,
}

impl ListingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &ListingKey) -> bool {
        self.slots.iter().any(|(k, _)| k == key)
    }

    pub fn sort_of(&self, key: &ListingKey) -> Option<SortSpec> {
        self.slots.iter().find(|(k, _)| k == key).map(|(_, s)| *s)
    }

    /// Mark `key` as most recently used with `sort`, returning evicted keys.
    pub fn touch(&mut self, key: ListingKey, sort: SortSpec) -> Vec<ListingKey> {
        self.remove(&key);
        self.slots.push_back((key, sort));

        let mut evicted = Vec::new();
        while self.slots.len() > self.capacity {
            if let Some((key, _)) = self.slots.pop_front() {
                evicted.push(key);
            }
        }
        evicted
    }

    pub fn remove(&mut self, key: &ListingKey) -> bool {
        match self.slots.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.slots.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<ListingKey> {
        self.slots.iter().map(|(k, _)| k.clone()).collect()
    }
}
