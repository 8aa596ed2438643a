//! Shard internals: one locked map plus its insertion-order queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::EvictFn;

/// A single shard. The mutex covers the map and all per-entry state.
pub(crate) struct Shard<V> {
    state: Mutex<ShardState<V>>,
}

pub(crate) struct ShardState<V> {
    pub(crate) entries: HashMap<Arc<str>, V>,
    /// Keys in insertion order, used for the round-robin eviction scan.
    /// Invariant: every map key appears in the queue exactly once, since
    /// entries are only ever removed by the scan itself.
    pub(crate) order: VecDeque<Arc<str>>,
}

impl<V> Shard<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ShardState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ShardState<V>> {
        self.state.lock()
    }
}

impl<V> ShardState<V> {
    /// One bounded pass over the shard: examines each entry at most once,
    /// removing those the predicate reports expired and rotating
    /// survivors to the back of the queue. Returns the number removed.
    pub(crate) fn evict_expired(&mut self, is_expired: &EvictFn<V>) -> usize {
        let mut removed = 0;
        for _ in 0..self.order.len() {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            let expired = self.entries.get(&*key).map_or(true, |v| is_expired(v));
            if expired {
                self.entries.remove(&*key);
                removed += 1;
            } else {
                self.order.push_back(key);
            }
        }
        removed
    }
}
