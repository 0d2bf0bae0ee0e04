//! Sharded in-memory bucket store.
//!
//! Each shard is an `RwLock` over a map of per-bucket `Mutex`es. Work on an existing bucket holds
//! its shard's read lock plus that bucket's mutex, so unrelated keys never wait on each other.
//! Structural changes (creation, eviction) take the shard's write lock, which cannot be granted
//! while any operation on a bucket of that shard is still running.

use std::collections::hash_map::{Entry, RandomState};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::bucket::{BucketKey, CallerId, QuotaBucket};
use crate::category::QuotaCategory;

type Shard = RwLock<HashMap<BucketKey, Mutex<QuotaBucket>>>;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 64;

/// Owner of every live [`QuotaBucket`]. At most one bucket exists per [`BucketKey`].
#[derive(Debug)]
pub struct BucketStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl BucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with `shards` shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, hasher: RandomState::new() }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &BucketKey) -> &Shard {
        let mut h = self.hasher.build_hasher();
        key.hash(&mut h);
        let idx = (h.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Run `f` with exclusive access to the bucket for `key`, creating it from `init` first if it
    /// does not exist.
    ///
    /// Concurrent first access from several threads creates exactly one bucket; `init` runs at
    /// most once per created bucket and never for a bucket that already exists.
    ///
    /// The shard's read lock is held while waiting for the bucket's mutex. Since the shard lock is
    /// fair, a queued insertion or eviction in the same shard also delays readers of other keys
    /// there until the busy bucket is released. Raise the shard count to dilute this.
    pub fn with_bucket<R>(
        &self,
        key: &BucketKey,
        init: impl FnOnce() -> QuotaBucket,
        f: impl FnOnce(&mut QuotaBucket) -> R,
    ) -> R {
        let shard = self.shard(key);
        {
            let map = shard.read();
            if let Some(cell) = map.get(key) {
                return f(&mut *cell.lock());
            }
        }
        let mut map = shard.write();
        // Another thread may have created it between the two locks.
        let cell = map.entry(key.clone()).or_insert_with(|| {
            let bucket = init();
            trace!(
                target: "quotawarden::store",
                caller = %key.caller(),
                category = %key.category(),
                remaining = %bucket.remaining(),
                "bucket created"
            );
            Mutex::new(bucket)
        });
        f(cell.get_mut())
    }

    /// Current stored value for `key`, without creating a bucket.
    pub fn peek(&self, key: &BucketKey) -> Option<QuotaBucket> {
        let map = self.shard(key).read();
        map.get(key).map(|cell| *cell.lock())
    }

    /// Insert `bucket` unless a bucket for `key` already exists. Returns `true` when inserted.
    pub fn insert_if_absent(&self, key: BucketKey, bucket: QuotaBucket) -> bool {
        let mut map = self.shard(&key).write();
        match map.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(bucket));
                true
            }
        }
    }

    /// Remove the bucket for `key`. Returns `true` when a bucket was removed.
    pub fn evict(&self, key: &BucketKey) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    /// Remove every bucket belonging to `caller`. Returns the number removed.
    pub fn evict_caller(&self, caller: &CallerId) -> usize {
        QuotaCategory::ALL
            .iter()
            .filter(|category| self.evict(&BucketKey::new(caller.clone(), **category)))
            .count()
    }

    /// Remove buckets last written strictly before `cutoff_millis`. Returns the number removed.
    pub fn evict_idle(&self, cutoff_millis: u64) -> usize {
        let mut evicted = 0;
        for shard in self.shards.iter() {
            let mut map = shard.write();
            let before = map.len();
            map.retain(|_, cell| cell.get_mut().last_updated_millis() >= cutoff_millis);
            evicted += before - map.len();
        }
        evicted
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Copy of every bucket, each read under its own lock. Not a point-in-time view across
    /// buckets.
    pub fn snapshot(&self) -> Vec<(BucketKey, QuotaBucket)> {
        let mut out = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            let map = shard.read();
            out.extend(map.iter().map(|(key, cell)| (key.clone(), *cell.lock())));
        }
        out
    }
}
