//! Snapshot persistence collaborator.
//!
//! The limiter never performs I/O on the request path. It copies bucket state into a
//! [`Snapshot`] and hands it to a [`SnapshotStore`]; restoring reads one back at startup.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bucket::{BucketKey, CallerId, QuotaBucket};
use crate::category::QuotaCategory;
use crate::error::PersistenceError;
use crate::quota::Quota;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time copy of bucket state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version; see [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// Clock reading when the snapshot was collected.
    pub taken_at_millis: u64,
    /// One entry per bucket, sorted by key.
    pub entries: Vec<SnapshotEntry>,
}

/// Persisted state of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub caller: CallerId,
    pub category: QuotaCategory,
    /// Remaining budget in micro-units; exact, unlike a float.
    pub remaining_micros: u64,
    pub last_updated_millis: u64,
}

impl SnapshotEntry {
    pub fn new(key: &BucketKey, bucket: &QuotaBucket) -> Self {
        Self {
            caller: key.caller().clone(),
            category: key.category(),
            remaining_micros: bucket.remaining().as_micros(),
            last_updated_millis: bucket.last_updated_millis(),
        }
    }

    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.caller.clone(), self.category)
    }

    pub fn bucket(&self) -> QuotaBucket {
        QuotaBucket::new(Quota::from_micros(self.remaining_micros), self.last_updated_millis)
    }
}

impl Snapshot {
    /// Build a snapshot from `(key, bucket)` pairs. Entries are sorted so equal state always
    /// encodes to equal bytes.
    pub fn from_buckets<I>(taken_at_millis: u64, buckets: I) -> Self
    where
        I: IntoIterator<Item = (BucketKey, QuotaBucket)>,
    {
        let mut entries: Vec<SnapshotEntry> =
            buckets.into_iter().map(|(key, bucket)| SnapshotEntry::new(&key, &bucket)).collect();
        entries.sort_by(|a, b| (&a.caller, a.category).cmp(&(&b.caller, b.category)));
        Self { version: SNAPSHOT_VERSION, taken_at_millis, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject snapshots this build cannot interpret.
    pub fn check_version(&self) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Storage backend for snapshots.
///
/// Implementations must be safe to call from any task. `save_snapshot` replaces whatever was
/// stored before.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recently saved snapshot, or `None` if nothing was ever saved.
    async fn load_snapshot(&self) -> Result<Option<Snapshot>, PersistenceError>;

    /// Persist `snapshot`.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    async fn load_snapshot(&self) -> Result<Option<Snapshot>, PersistenceError> {
        (**self).load_snapshot().await
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        (**self).save_snapshot(snapshot).await
    }
}

/// In-memory snapshot store, useful for tests and for handing state between limiter instances in
/// one process.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    slot: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already stored.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self { slot: Mutex::new(Some(snapshot)), saves: Mutex::new(0) }
    }

    /// Currently stored snapshot.
    pub fn current(&self) -> Option<Snapshot> {
        self.slot.lock().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load_snapshot(&self) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self.slot.lock().clone())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        *self.slot.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}
