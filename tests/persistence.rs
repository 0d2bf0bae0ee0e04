mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::test_helpers::limiter_with;
use quotawarden::{
    Checkpointer, InMemorySnapshotStore, PersistenceError, Quota, QuotaCategory, Snapshot,
    SnapshotStore,
};

const FG: QuotaCategory = QuotaCategory::ForegroundCall;

#[tokio::test]
async fn snapshot_round_trip_is_exact() {
    let (original, clock) = limiter_with(FG, 10.0, 0.1);
    original.try_consume("a", FG, 3.333_333).unwrap();
    clock.set(12);
    original.try_consume("b", FG, 9.999_999).unwrap();
    original.try_consume("a", FG, 0.5).unwrap();
    let store = InMemorySnapshotStore::new();
    original.checkpoint(&store).await.unwrap();

    let (restored, restored_clock) = limiter_with(FG, 10.0, 0.1);
    restored_clock.set(12);
    assert_eq!(restored.restore(&store).await, 2);

    let saved = store.current().unwrap();
    assert_eq!(restored.snapshot(), saved);
    assert_eq!(
        serde_json::to_vec(&restored.snapshot()).unwrap(),
        serde_json::to_vec(&saved).unwrap()
    );

    for t in [12, 13, 50, 99, 10_000] {
        clock.set(t);
        restored_clock.set(t);
        for caller in ["a", "b"] {
            assert_eq!(
                restored.query_remaining(caller, FG).unwrap(),
                original.query_remaining(caller, FG).unwrap(),
                "caller {caller} at t={t}"
            );
        }
    }
}

#[tokio::test]
async fn missing_snapshot_starts_full() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    assert_eq!(limiter.restore(&InMemorySnapshotStore::new()).await, 0);
    assert_eq!(limiter.query_remaining("x", FG).unwrap(), Quota::from_units(10));
}

#[derive(Default)]
struct FlakyStore {
    attempts: AtomicUsize,
    inner: InMemorySnapshotStore,
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn load_snapshot(&self) -> Result<Option<Snapshot>, PersistenceError> {
        Err(PersistenceError::Backend("unavailable".into()))
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        // Every other save fails.
        if self.attempts.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            return Err(PersistenceError::Backend("disk full".into()));
        }
        self.inner.save_snapshot(snapshot).await
    }
}

#[tokio::test]
async fn load_failure_fails_open() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    assert_eq!(limiter.restore(&FlakyStore::default()).await, 0);
    assert!(limiter.try_consume("x", FG, 10.0).unwrap().is_allowed());
}

#[tokio::test]
async fn checkpoint_failure_is_returned_and_state_kept() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    limiter.try_consume("x", FG, 4.0).unwrap();
    let store = FlakyStore::default();
    assert!(limiter.checkpoint(&store).await.is_err());
    assert_eq!(limiter.query_remaining("x", FG).unwrap(), Quota::from_units(6));
    assert_eq!(limiter.checkpoint(&store).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn checkpointer_saves_every_interval_and_on_shutdown() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    limiter.try_consume("x", FG, 1.0).unwrap();
    let store = Arc::new(InMemorySnapshotStore::new());
    let checkpointer =
        Checkpointer::spawn_every(limiter.clone(), store.clone(), Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(store.save_count(), 2);

    limiter.try_consume("y", FG, 1.0).unwrap();
    let stats = checkpointer.shutdown().await;
    assert_eq!(stats.saves, 3);
    assert_eq!(stats.failures, 0);
    assert_eq!(store.current().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn checkpointer_survives_save_failures() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    let store = Arc::new(FlakyStore::default());
    let checkpointer =
        Checkpointer::spawn_every(limiter.clone(), store.clone(), Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let stats = checkpointer.shutdown().await;
    // Four ticks and the final save alternate fail/succeed.
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.saves, 2);
    assert!(store.inner.current().is_some());
}

#[tokio::test]
async fn shutdown_without_ticks_still_saves() {
    let (limiter, _) = limiter_with(FG, 10.0, 0.1);
    limiter.try_consume("only", FG, 2.0).unwrap();
    let store = Arc::new(InMemorySnapshotStore::new());
    let checkpointer = Checkpointer::spawn(limiter, store.clone());
    let stats = checkpointer.shutdown().await;
    assert_eq!(stats.saves, 1);
    let saved = store.current().unwrap();
    assert_eq!(saved.entries[0].remaining_micros, 8_000_000);
}
