//! Bounded, insertion-stable priority queue for pending requests.
//!
//! Ordering is strict priority first, then submission sequence, so equal
//! priorities are served FIFO. When over capacity the *tail* is trimmed:
//! the lowest-priority, most-recently-queued entry goes first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::request::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: Reverse<Priority>,
    seq: u64,
}

#[derive(Debug)]
pub(crate) struct PendingQueue<T> {
    order: BTreeMap<QueueKey, (String, T)>,
    index: HashMap<String, QueueKey>,
    capacity: usize,
}

impl<T> PendingQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: BTreeMap::new(),
            index: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Insert `item`; returns whatever was trimmed to stay within capacity
    /// (possibly the item itself). Re-inserting an existing id replaces it.
    pub(crate) fn push(&mut self, id: String, priority: Priority, seq: u64, item: T) -> Vec<T> {
        let mut trimmed = Vec::new();
        if let Some(old) = self.remove(&id) {
            trimmed.push(old);
        }
        let key = QueueKey {
            rank: Reverse(priority),
            seq,
        };
        self.index.insert(id.clone(), key);
        self.order.insert(key, (id, item));

        while self.order.len() > self.capacity {
            if let Some((_, (id, item))) = self.order.pop_last() {
                self.index.remove(&id);
                trimmed.push(item);
            }
        }
        trimmed
    }

    /// Priority of the head entry, if any.
    pub(crate) fn peek_priority(&self) -> Option<Priority> {
        self.order.first_key_value().map(|(k, _)| k.rank.0)
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let (_, (id, item)) = self.order.pop_first()?;
        self.index.remove(&id);
        Some(item)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<T> {
        let key = self.index.remove(id)?;
        self.order.remove(&key).map(|(_, item)| item)
    }

    /// Remove and return every entry matching `pred`, in queue order.
    pub(crate) fn extract_if(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let keys: Vec<QueueKey> = self
            .order
            .iter()
            .filter(|(_, (_, item))| pred(item))
            .map(|(k, _)| *k)
            .collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((id, item)) = self.order.remove(&key) {
                self.index.remove(&id);
                out.push(item);
            }
        }
        out
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.values().map(|(_, item)| item)
    }
}
