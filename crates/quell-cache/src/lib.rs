//! # Quell Account Cache
//!
//! A fixed-capacity, concurrency-safe map from string keys to opaque
//! entries, built for the quell rate-limiting engine.
//!
//! ## Architecture
//!
//! - **1024 shards**: keys are distributed across [`SHARD_COUNT`]
//!   independently locked shards, so unrelated accounts never contend.
//! - **One mutating primitive**: [`Cache::update_or_insert`] is the only
//!   way entries change. The update or insert closure runs under the
//!   shard lock, which serializes all mutations of one account.
//! - **Opportunistic eviction**: the cache holds at most `max_depth`
//!   entries per shard. When an insert lands on a full shard, one bounded
//!   pass over the shard removes every entry the installed predicate
//!   reports expired; if nothing can be evicted the insert is refused
//!   with [`Outcome::ShardFull`].
//!
//! The cache never evicts on a timer. Memory is bounded by
//! `SHARD_COUNT * max_depth`; reclamation happens only under insertion
//! pressure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

mod shard;

use shard::Shard;

/// Number of shards. Fixed so the per-shard depth limit (and thus the
/// worst-case eviction scan) stays bounded regardless of configuration.
pub const SHARD_COUNT: usize = 1024;

/// Eviction predicate installed at construction. Returns true when the
/// entry may be removed to make room for a new one.
///
/// The predicate is invoked with the shard lock held and must not call
/// back into the cache.
pub type EvictFn<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

/// Result of [`Cache::update_or_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<R> {
    /// The key existed; carries the update closure's return value.
    Updated(R),
    /// The key did not exist and a new entry was stored.
    Inserted,
    /// The key did not exist, the shard is at capacity, and no entry was
    /// eligible for eviction.
    ShardFull,
}

/// Fixed-capacity sharded map.
///
/// `V` is opaque to the cache; all interpretation of entries happens in
/// the closures supplied by the caller and in the eviction predicate.
pub struct Cache<V> {
    shards: Vec<Shard<V>>,
    max_depth: usize,
    is_expired: EvictFn<V>,
}

impl<V> Cache<V> {
    /// Creates a cache with the given per-shard depth limit and eviction
    /// predicate.
    ///
    /// `max_depth` is interpreted per shard, not globally; a value below
    /// one is raised to one so every shard can hold at least one entry.
    pub fn new(max_depth: usize, is_expired: EvictFn<V>) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::new()).collect(),
            max_depth: max_depth.max(1),
            is_expired,
        }
    }

    /// Atomically updates the entry under `key`, or inserts a new one.
    ///
    /// If `key` exists, `update` runs against the entry and its return
    /// value comes back as [`Outcome::Updated`]. Otherwise `insert`
    /// constructs a fresh entry, evicting expired entries first if the
    /// shard is full. Both closures execute while the shard lock is held
    /// and must not reenter the cache.
    pub fn update_or_insert<R, U, I>(&self, key: &str, update: U, insert: I) -> Outcome<R>
    where
        U: FnOnce(&mut V) -> R,
        I: FnOnce() -> V,
    {
        let shard = &self.shards[self.shard_index(key)];
        let mut state = shard.lock();

        if let Some(value) = state.entries.get_mut(key) {
            return Outcome::Updated(update(value));
        }

        if state.entries.len() >= self.max_depth && state.evict_expired(&self.is_expired) == 0 {
            return Outcome::ShardFull;
        }

        let key: std::sync::Arc<str> = std::sync::Arc::from(key);
        state.order.push_back(std::sync::Arc::clone(&key));
        state.entries.insert(key, insert());
        Outcome::Inserted
    }

    /// Total number of entries across all shards.
    ///
    /// Locks each shard briefly in turn; intended for statistics, not
    /// for synchronization.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    /// Returns true if no shard holds any entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-shard depth limit after clamping.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % SHARD_COUNT as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn never_expire() -> EvictFn<u64> {
        Box::new(|_| false)
    }

    #[test]
    fn test_insert_then_update() {
        let cache: Cache<u64> = Cache::new(4, never_expire());

        assert_eq!(cache.update_or_insert("k", |v| *v += 1, || 1), Outcome::Inserted);
        assert_eq!(cache.update_or_insert("k", |v| {
            *v += 1;
            *v
        }, || 1), Outcome::Updated(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_min_depth_is_one() {
        let cache: Cache<u64> = Cache::new(0, never_expire());
        assert_eq!(cache.max_depth(), 1);
    }

    #[test]
    fn test_shard_full_when_nothing_expires() {
        let probes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&probes);
        let cache: Cache<u64> = Cache::new(1, Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            false
        }));

        // With depth 1 and 1024 shards, pigeonhole guarantees a full
        // shard within SHARD_COUNT + 1 distinct keys.
        let mut full = None;
        for ix in 0..=SHARD_COUNT {
            let key = format!("key-{ix}");
            if cache.update_or_insert(&key, |_| (), || 0) == Outcome::ShardFull {
                full = Some(key);
                break;
            }
        }

        let full = full.expect("expected a shard to fill up");
        assert!(probes.load(Ordering::Relaxed) > 0, "predicate never consulted");
        assert!(cache.len() <= SHARD_COUNT);

        // The refused insert must not leave the shard lock held or the
        // shard unusable: updates and other-shard inserts still work.
        assert_eq!(cache.update_or_insert(&full, |_| (), || 0), Outcome::ShardFull);
        assert_eq!(cache.update_or_insert("key-0", |v| *v, || 9), Outcome::Updated(0));
    }

    #[test]
    fn test_eviction_makes_room() {
        let cache: Cache<u64> = Cache::new(2, Box::new(|_| true));

        // Everything is always expired, so inserts never fail and no
        // shard grows past its depth limit.
        for ix in 0..10_000 {
            let key = format!("key-{ix}");
            assert_eq!(cache.update_or_insert(&key, |_| (), || 0), Outcome::Inserted);
        }
        assert!(cache.len() <= SHARD_COUNT * 2);
    }

    #[test]
    fn test_eviction_retries_insert() {
        let expired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&expired);
        // Expire entries only once the flag is raised.
        let cache: Cache<u64> = Cache::new(1, Box::new(move |_| flag.load(Ordering::Relaxed) > 0));

        let mut keys = Vec::new();
        for ix in 0..=SHARD_COUNT {
            let key = format!("key-{ix}");
            if cache.update_or_insert(&key, |_| (), || 0) == Outcome::ShardFull {
                keys.push(key);
                break;
            }
        }
        let blocked = keys.pop().expect("expected a full shard");

        expired.store(1, Ordering::Relaxed);
        assert_eq!(cache.update_or_insert(&blocked, |_| (), || 0), Outcome::Inserted);
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        const THREADS: usize = 8;
        const OPS: u64 = 10_000;

        let cache: Arc<Cache<u64>> = Arc::new(Cache::new(16, never_expire()));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..OPS {
                        cache.update_or_insert("shared", |v| *v += 1, || 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // First call inserted 1, every other call added 1.
        let total = match cache.update_or_insert("shared", |v| *v, || 0) {
            Outcome::Updated(v) => v,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(total, THREADS as u64 * OPS);
    }
}
