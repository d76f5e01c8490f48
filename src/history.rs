//! Bounded in-memory ring buffer.
//!
//! Backs the selection decision log and the audit log: appends evict the
//! oldest entry once capacity is reached, readers get clones in chronological
//! order.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Thread-safe ring buffer holding at most `capacity` entries.
#[derive(Debug)]
pub struct RingBuffer<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates a buffer; a zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest if at capacity.
    pub fn push(&self, entry: T) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns all entries in chronological order (oldest first).
    pub fn get_all(&self) -> Vec<T> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Returns the newest `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<T> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
