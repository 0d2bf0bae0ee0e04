//! The rate limiter facade.
//!
//! [`RateLimiter`] is the only component request-handling code talks to. Each call validates its
//! inputs, resolves the category's current limits, and runs the check-and-deduct step under the
//! bucket's exclusive lock in the [`BucketStore`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::adaptive::LiveLimits;
use crate::bucket::{BucketKey, CallerId, QuotaBucket};
use crate::category::{CategoryLimits, QuotaCategory};
use crate::clock::{Clock, SystemClock};
use crate::config::{LimitTable, RateLimiterConfig};
use crate::error::{ConfigError, ContractViolation, PersistenceError};
use crate::persistence::{Snapshot, SnapshotStore};
use crate::policy;
use crate::quota::Quota;
use crate::store::BucketStore;

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The cost was deducted.
    Allowed {
        /// Budget left in the bucket after this request. [`Quota::MAX`] for unmetered requests.
        remaining: Quota,
    },
    /// Not enough budget; nothing was deducted.
    Denied {
        /// Minimum wait before the same cost can succeed, assuming nobody else consumes.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// Remaining budget, when allowed.
    pub fn remaining(&self) -> Option<Quota> {
        match self {
            Decision::Allowed { remaining } => Some(*remaining),
            Decision::Denied { .. } => None,
        }
    }

    /// Retry hint, when denied.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { retry_after } => Some(*retry_after),
        }
    }

    /// Retry hint in whole milliseconds, when denied.
    pub fn retry_after_millis(&self) -> Option<u64> {
        self.retry_after().map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

#[derive(Debug)]
struct LimiterState {
    store: BucketStore,
    limits: LiveLimits,
    idle_eviction: Duration,
    checkpoint_interval: Duration,
}

/// Per-caller, per-category quota limiter.
///
/// Clones share the same buckets and limits via `Arc`, so every handle observes and affects the
/// same budgets.
///
/// # Examples
/// ```
/// use quotawarden::{CategoryLimits, ManualClock, QuotaCategory, RateLimiter, RateLimiterConfig};
/// use std::time::Duration;
///
/// let config = RateLimiterConfig::builder()
///     .limit(QuotaCategory::ForegroundCall, CategoryLimits::new(10.0, 0.1).unwrap())
///     .build()
///     .unwrap();
/// let clock = ManualClock::new(0);
/// let limiter = RateLimiter::new(config).unwrap().with_clock(clock.clone());
///
/// assert!(limiter.try_consume("app1", QuotaCategory::ForegroundCall, 10.0).unwrap().is_allowed());
/// let denied = limiter.try_consume("app1", QuotaCategory::ForegroundCall, 1.0).unwrap();
/// assert_eq!(denied.retry_after(), Some(Duration::from_millis(10)));
/// clock.advance(10);
/// assert!(limiter.try_consume("app1", QuotaCategory::ForegroundCall, 1.0).unwrap().is_allowed());
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    state: Arc<LimiterState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the wall clock, validating `config`.
    pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = LimiterState {
            store: BucketStore::with_shards(config.shards()),
            limits: LiveLimits::new(config.limits().clone()),
            idle_eviction: config.idle_eviction(),
            checkpoint_interval: config.checkpoint_interval(),
        };
        Ok(Self { state: Arc::new(state), clock: Arc::new(SystemClock) })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Current clock reading.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Try to consume `cost` units from `caller`'s budget for `category`.
    ///
    /// Denial is an ordinary outcome. `Err` means the request itself was malformed and no bucket
    /// state was touched.
    pub fn try_consume(
        &self,
        caller: impl Into<CallerId>,
        category: QuotaCategory,
        cost: f64,
    ) -> Result<Decision, ContractViolation> {
        let caller = caller.into();
        let Some(cost) = Quota::from_f64(cost) else {
            return Err(self.violation(&caller, category, ContractViolation::InvalidCost(cost)));
        };
        self.consume(caller, category, cost)
    }

    /// [`try_consume`](Self::try_consume) for a cost already in fixed point.
    pub fn try_consume_quota(
        &self,
        caller: impl Into<CallerId>,
        category: QuotaCategory,
        cost: Quota,
    ) -> Result<Decision, ContractViolation> {
        self.consume(caller.into(), category, cost)
    }

    fn consume(
        &self,
        caller: CallerId,
        category: QuotaCategory,
        cost: Quota,
    ) -> Result<Decision, ContractViolation> {
        let Some(limits) = self.resolve(&caller, category)? else {
            return Ok(Decision::Allowed { remaining: Quota::MAX });
        };
        let now = self.clock.now_millis();
        let key = BucketKey::new(caller, category);
        let settled = self.state.store.with_bucket(
            &key,
            || QuotaBucket::full(limits.capacity(), now),
            |bucket| {
                let settled = policy::settle(bucket, &limits, cost, now);
                *bucket = settled.next;
                settled
            },
        );

        if settled.allowed {
            return Ok(Decision::Allowed { remaining: settled.next.remaining() });
        }
        let retry_after = settled.retry_after(cost, &limits, now);
        debug!(
            target: "quotawarden::limiter",
            caller = %key.caller(),
            category = %category,
            cost = %cost,
            available = %settled.entitlement,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "quota denied"
        );
        Ok(Decision::Denied { retry_after })
    }

    /// Budget `caller` could spend in `category` right now.
    ///
    /// Computes the replenished amount without writing it back and without creating a bucket; a
    /// caller never seen before reports full capacity. Unmetered categories report
    /// [`Quota::MAX`].
    pub fn query_remaining(
        &self,
        caller: impl Into<CallerId>,
        category: QuotaCategory,
    ) -> Result<Quota, ContractViolation> {
        let caller = caller.into();
        let Some(limits) = self.resolve(&caller, category)? else {
            return Ok(Quota::MAX);
        };
        let key = BucketKey::new(caller, category);
        let now = self.clock.now_millis();
        Ok(match self.state.store.peek(&key) {
            Some(bucket) => policy::entitlement(&bucket, &limits, now),
            None => limits.capacity(),
        })
    }

    /// Restore a bucket to full capacity. Administrative; not part of normal traffic handling.
    pub fn reset_bucket(
        &self,
        caller: impl Into<CallerId>,
        category: QuotaCategory,
    ) -> Result<(), ContractViolation> {
        let caller = caller.into();
        let Some(limits) = self.resolve(&caller, category)? else {
            return Ok(());
        };
        let now = self.clock.now_millis();
        let key = BucketKey::new(caller, category);
        let capacity = limits.capacity();
        self.state.store.with_bucket(
            &key,
            || QuotaBucket::full(capacity, now),
            |bucket| *bucket = QuotaBucket::full(capacity, now.max(bucket.last_updated_millis())),
        );
        info!(
            target: "quotawarden::limiter",
            caller = %key.caller(),
            category = %category,
            "bucket reset to full capacity"
        );
        Ok(())
    }

    /// Stored state of a bucket, if it exists. Does not apply replenishment.
    pub fn bucket(&self, caller: impl Into<CallerId>, category: QuotaCategory) -> Option<QuotaBucket> {
        self.state.store.peek(&BucketKey::new(caller, category))
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.state.store.len()
    }

    /// Drop one bucket. Its next use starts from full capacity.
    pub fn evict(&self, caller: impl Into<CallerId>, category: QuotaCategory) -> bool {
        self.state.store.evict(&BucketKey::new(caller, category))
    }

    /// Drop every bucket of a retired caller (e.g. uninstalled). Returns the number removed.
    pub fn evict_caller(&self, caller: impl Into<CallerId>) -> usize {
        let caller = caller.into();
        let evicted = self.state.store.evict_caller(&caller);
        if evicted > 0 {
            info!(target: "quotawarden::limiter", caller = %caller, evicted, "caller evicted");
        }
        evicted
    }

    /// Drop buckets idle for longer than the configured threshold.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_older_than(self.state.idle_eviction)
    }

    /// Drop buckets not written for longer than `idle`. Returns the number removed.
    pub fn evict_idle_older_than(&self, idle: Duration) -> usize {
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(idle_ms);
        let evicted = self.state.store.evict_idle(cutoff);
        debug!(
            target: "quotawarden::limiter",
            cutoff_millis = cutoff,
            evicted,
            remaining = self.state.store.len(),
            "idle eviction sweep"
        );
        evicted
    }

    /// Current limits of `category`.
    pub fn limits(&self, category: QuotaCategory) -> Option<CategoryLimits> {
        self.state.limits.get(category)
    }

    /// All configured limits.
    pub fn limit_table(&self) -> Arc<LimitTable> {
        self.state.limits.table()
    }

    /// Change the limits of a metered category without pausing traffic. Existing buckets keep
    /// their stored value, clamped to the new capacity on next access.
    ///
    /// Returns the previous limits. Unmetered categories cannot be limited; the call is ignored.
    pub fn update_limits(
        &self,
        category: QuotaCategory,
        limits: CategoryLimits,
    ) -> Option<CategoryLimits> {
        if !category.is_metered() {
            warn!(target: "quotawarden::limiter", category = %category, "ignoring limits for unmetered category");
            return None;
        }
        let previous = self.state.limits.set(category, limits);
        info!(
            target: "quotawarden::limiter",
            category = %category,
            capacity = %limits.capacity(),
            refill_rate_per_millis = %limits.refill_rate_per_millis(),
            "limits updated"
        );
        previous
    }

    /// Stop metering `category`; later requests for it are contract violations.
    pub fn remove_limits(&self, category: QuotaCategory) -> Option<CategoryLimits> {
        self.state.limits.remove(category)
    }

    pub fn idle_eviction(&self) -> Duration {
        self.state.idle_eviction
    }

    pub fn checkpoint_interval(&self) -> Duration {
        self.state.checkpoint_interval
    }

    /// Copy every bucket into a [`Snapshot`]. Each bucket's lock is held only while its value is
    /// copied.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_buckets(self.clock.now_millis(), self.state.store.snapshot())
    }

    /// Seed buckets from `snapshot`. Returns the number of buckets restored.
    ///
    /// Entries for unconfigured categories or blank callers are skipped; remaining budget is
    /// clamped to the current capacity; a timestamp ahead of the clock is pulled back to now.
    /// Buckets already live in memory win over snapshot entries.
    pub fn restore_from(&self, snapshot: &Snapshot) -> Result<usize, PersistenceError> {
        snapshot.check_version()?;
        let now = self.clock.now_millis();
        let table = self.state.limits.table();
        let mut restored = 0;
        let mut skipped = 0;
        for entry in &snapshot.entries {
            let limits = match table.get(&entry.category) {
                Some(limits) if !entry.caller.is_blank() => limits,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let stored = entry.bucket();
            let bucket = QuotaBucket::new(
                stored.remaining().min(limits.capacity()),
                stored.last_updated_millis().min(now),
            );
            if self.state.store.insert_if_absent(entry.key(), bucket) {
                restored += 1;
            }
        }
        info!(
            target: "quotawarden::limiter",
            restored,
            skipped,
            taken_at_millis = snapshot.taken_at_millis,
            "restored bucket snapshot"
        );
        Ok(restored)
    }

    /// Load the last snapshot from `store` and seed buckets from it.
    ///
    /// Fails open: if loading fails the limiter starts with full buckets and the error is
    /// only logged.
    pub async fn restore(&self, store: &dyn SnapshotStore) -> usize {
        let loaded = match store.load_snapshot().await {
            Ok(Some(snapshot)) => self.restore_from(&snapshot),
            Ok(None) => return 0,
            Err(e) => Err(e),
        };
        match loaded {
            Ok(restored) => restored,
            Err(e) => {
                warn!(
                    target: "quotawarden::limiter",
                    error = %e,
                    "snapshot restore failed; starting with full buckets"
                );
                0
            }
        }
    }

    /// Save the current state to `store`. No lock is held while the save is awaited.
    ///
    /// A failure is logged and returned; in-memory state stays authoritative either way.
    pub async fn checkpoint(&self, store: &dyn SnapshotStore) -> Result<usize, PersistenceError> {
        let snapshot = self.snapshot();
        let entries = snapshot.len();
        match store.save_snapshot(&snapshot).await {
            Ok(()) => {
                debug!(target: "quotawarden::limiter", entries, "checkpoint saved");
                Ok(entries)
            }
            Err(e) => {
                warn!(target: "quotawarden::limiter", entries, error = %e, "checkpoint save failed");
                Err(e)
            }
        }
    }

    /// Validate caller and category. `Ok(None)` means the category is unmetered.
    fn resolve(
        &self,
        caller: &CallerId,
        category: QuotaCategory,
    ) -> Result<Option<CategoryLimits>, ContractViolation> {
        if caller.is_blank() {
            return Err(self.violation(caller, category, ContractViolation::EmptyCallerId));
        }
        if !category.is_metered() {
            return Ok(None);
        }
        match self.state.limits.get(category) {
            Some(limits) => Ok(Some(limits)),
            None => Err(self.violation(
                caller,
                category,
                ContractViolation::UnknownCategory(category),
            )),
        }
    }

    fn violation(
        &self,
        caller: &CallerId,
        category: QuotaCategory,
        violation: ContractViolation,
    ) -> ContractViolation {
        error!(
            target: "quotawarden::limiter",
            caller = %caller,
            category = %category,
            violation = %violation,
            "quota contract violation"
        );
        violation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::InMemorySnapshotStore;

    const FG: QuotaCategory = QuotaCategory::ForegroundCall;

    fn limiter(capacity: f64, rate: f64) -> (RateLimiter, ManualClock) {
        let config = RateLimiterConfig::builder()
            .limit(FG, CategoryLimits::new(capacity, rate).unwrap())
            .idle_eviction(Duration::from_millis(1_000))
            .shards(4)
            .build()
            .unwrap();
        let clock = ManualClock::new(0);
        (RateLimiter::new(config).unwrap().with_clock(clock.clone()), clock)
    }

    #[test]
    fn end_to_end_scenario() {
        let (l, clock) = limiter(10.0, 0.1);
        assert_eq!(
            l.try_consume("app1", FG, 10.0).unwrap(),
            Decision::Allowed { remaining: Quota::ZERO }
        );
        assert_eq!(
            l.try_consume("app1", FG, 1.0).unwrap(),
            Decision::Denied { retry_after: Duration::from_millis(10) }
        );
        clock.set(10);
        assert_eq!(
            l.try_consume("app1", FG, 1.0).unwrap(),
            Decision::Allowed { remaining: Quota::ZERO }
        );
    }

    #[test]
    fn retry_after_is_exact() {
        let (l, clock) = limiter(100.0, 1.0);
        assert!(l.try_consume("c", FG, 100.0).unwrap().is_allowed());
        let denied = l.try_consume("c", FG, 50.0).unwrap();
        assert_eq!(denied.retry_after_millis(), Some(50));
        clock.advance(50);
        assert!(l.try_consume("c", FG, 50.0).unwrap().is_allowed());
    }

    #[test]
    fn denial_stores_entitlement_and_now() {
        let (l, clock) = limiter(10.0, 0.1);
        l.try_consume("c", FG, 10.0).unwrap();
        clock.set(20);
        assert!(l.try_consume("c", FG, 5.0).unwrap().is_denied());
        assert_eq!(l.bucket("c", FG), Some(QuotaBucket::new(Quota::from_units(2), 20)));
        // The 20ms already credited are not credited again.
        assert_eq!(
            l.try_consume("c", FG, 5.0).unwrap(),
            Decision::Denied { retry_after: Duration::from_millis(30) }
        );
    }

    #[test]
    fn backward_clock_grants_nothing_and_keeps_timestamp() {
        let (l, clock) = limiter(10.0, 1.0);
        clock.set(1_000);
        l.try_consume("c", FG, 10.0).unwrap();
        clock.set(500);
        assert!(l.try_consume("c", FG, 1.0).unwrap().is_denied());
        assert_eq!(l.query_remaining("c", FG).unwrap(), Quota::ZERO);
        assert_eq!(l.bucket("c", FG).unwrap().last_updated_millis(), 1_000);
    }

    #[test]
    fn query_does_not_create_or_write() {
        let (l, clock) = limiter(10.0, 0.1);
        assert_eq!(l.query_remaining("new", FG).unwrap(), Quota::from_units(10));
        assert_eq!(l.bucket_count(), 0);
        l.try_consume("c", FG, 10.0).unwrap();
        clock.set(30);
        assert_eq!(l.query_remaining("c", FG).unwrap(), Quota::from_units(3));
        assert_eq!(l.bucket("c", FG), Some(QuotaBucket::new(Quota::ZERO, 0)));
    }

    #[test]
    fn contract_violations_touch_nothing() {
        let (l, _) = limiter(10.0, 0.1);
        assert_eq!(l.try_consume("", FG, 1.0), Err(ContractViolation::EmptyCallerId));
        assert_eq!(l.try_consume("  ", FG, 1.0), Err(ContractViolation::EmptyCallerId));
        assert!(matches!(
            l.try_consume("c", FG, -1.0),
            Err(ContractViolation::InvalidCost(_))
        ));
        assert!(matches!(
            l.try_consume("c", FG, f64::NAN),
            Err(ContractViolation::InvalidCost(_))
        ));
        assert_eq!(
            l.try_consume("c", QuotaCategory::DataWrite, 1.0),
            Err(ContractViolation::UnknownCategory(QuotaCategory::DataWrite))
        );
        assert_eq!(l.query_remaining("", FG), Err(ContractViolation::EmptyCallerId));
        assert_eq!(l.bucket_count(), 0);
    }

    #[test]
    fn cost_above_capacity_is_denied() {
        let (l, _) = limiter(10.0, 0.1);
        assert_eq!(
            l.try_consume("c", FG, 11.0),
            Ok(Decision::Denied { retry_after: Duration::from_millis(10) })
        );
        assert_eq!(l.query_remaining("c", FG).unwrap(), Quota::from_units(10));

        // Lowering capacity live turns oversized traffic into denials, not errors.
        l.update_limits(FG, CategoryLimits::new(4.0, 0.1).unwrap());
        assert_eq!(
            l.try_consume("c", FG, 5.0),
            Ok(Decision::Denied { retry_after: Duration::from_millis(10) })
        );
        assert!(l.try_consume("c", FG, 4.0).unwrap().is_allowed());
    }

    #[test]
    fn retry_hint_covers_a_clock_that_went_backwards() {
        let (l, clock) = limiter(10.0, 1.0);
        clock.set(1_000);
        l.try_consume("c", FG, 10.0).unwrap();
        clock.set(500);
        let denied = l.try_consume("c", FG, 1.0).unwrap();
        assert_eq!(denied.retry_after_millis(), Some(501));
        clock.set(1_000);
        assert!(l.try_consume("c", FG, 1.0).unwrap().is_denied());
        clock.set(1_001);
        assert!(l.try_consume("c", FG, 1.0).unwrap().is_allowed());
    }

    #[test]
    fn unmetered_is_always_allowed() {
        let (l, _) = limiter(1.0, 0.001);
        for _ in 0..100 {
            assert_eq!(
                l.try_consume("c", QuotaCategory::Unmetered, 1e9).unwrap(),
                Decision::Allowed { remaining: Quota::MAX }
            );
        }
        assert_eq!(l.bucket_count(), 0);
    }

    #[test]
    fn zero_cost_is_allowed_when_empty() {
        let (l, _) = limiter(1.0, 0.001);
        l.try_consume("c", FG, 1.0).unwrap();
        assert!(l.try_consume("c", FG, 0.0).unwrap().is_allowed());
    }

    #[test]
    fn reset_refills() {
        let (l, _) = limiter(10.0, 0.1);
        l.try_consume("c", FG, 7.0).unwrap();
        l.reset_bucket("c", FG).unwrap();
        assert_eq!(l.query_remaining("c", FG).unwrap(), Quota::from_units(10));
    }

    #[test]
    fn idle_eviction_then_revival() {
        let (l, clock) = limiter(10.0, 0.001);
        l.try_consume("idle", FG, 10.0).unwrap();
        clock.set(900);
        l.try_consume("busy", FG, 1.0).unwrap();
        clock.set(1_500);
        assert_eq!(l.evict_idle(), 1);
        assert!(l.bucket("idle", FG).is_none());
        assert_eq!(
            l.try_consume("idle", FG, 10.0).unwrap(),
            Decision::Allowed { remaining: Quota::ZERO }
        );
    }

    #[test]
    fn lowered_capacity_clamps_existing_bucket() {
        let (l, _) = limiter(10.0, 0.1);
        l.try_consume("c", FG, 1.0).unwrap();
        let previous = l.update_limits(FG, CategoryLimits::new(4.0, 0.1).unwrap());
        assert_eq!(previous.map(|p| p.capacity()), Some(Quota::from_units(10)));
        assert_eq!(l.query_remaining("c", FG).unwrap(), Quota::from_units(4));
        assert!(l.update_limits(QuotaCategory::Unmetered, CategoryLimits::new(1.0, 1.0).unwrap()).is_none());
        assert!(l.limits(QuotaCategory::Unmetered).is_none());
    }

    #[test]
    fn removed_limits_become_unknown() {
        let (l, _) = limiter(10.0, 0.1);
        l.remove_limits(FG);
        assert_eq!(
            l.try_consume("c", FG, 1.0),
            Err(ContractViolation::UnknownCategory(FG))
        );
    }

    #[test]
    fn restore_skips_clamps_and_keeps_live_buckets() {
        let (l, clock) = limiter(10.0, 0.1);
        clock.set(100);
        l.try_consume("live", FG, 1.0).unwrap();
        let snapshot = Snapshot::from_buckets(
            50,
            vec![
                (BucketKey::new("live", FG), QuotaBucket::new(Quota::ZERO, 50)),
                (BucketKey::new("big", FG), QuotaBucket::new(Quota::from_units(99), 40)),
                (BucketKey::new("future", FG), QuotaBucket::new(Quota::from_units(1), 5_000)),
                (
                    BucketKey::new("other", QuotaCategory::DataWrite),
                    QuotaBucket::new(Quota::ZERO, 10),
                ),
            ],
        );
        assert_eq!(l.restore_from(&snapshot).unwrap(), 2);
        assert_eq!(l.bucket("live", FG).unwrap().remaining(), Quota::from_units(9));
        assert_eq!(l.bucket("big", FG), Some(QuotaBucket::new(Quota::from_units(10), 40)));
        assert_eq!(l.bucket("future", FG), Some(QuotaBucket::new(Quota::from_units(1), 100)));
        assert!(l.bucket("other", QuotaCategory::DataWrite).is_none());
    }

    #[tokio::test]
    async fn checkpoint_then_restore_round_trips() {
        let (l, clock) = limiter(10.0, 0.1);
        l.try_consume("a", FG, 3.5).unwrap();
        clock.set(7);
        l.try_consume("b", FG, 0.25).unwrap();
        let store = InMemorySnapshotStore::new();
        assert_eq!(l.checkpoint(&store).await.unwrap(), 2);

        let (fresh, fresh_clock) = limiter(10.0, 0.1);
        fresh_clock.set(7);
        assert_eq!(fresh.restore(&store).await, 2);
        assert_eq!(fresh.snapshot(), l.snapshot());
        clock.set(40);
        fresh_clock.set(40);
        assert_eq!(fresh.query_remaining("a", FG), l.query_remaining("a", FG));
    }

    #[tokio::test]
    async fn restore_fails_open_on_bad_version() {
        let (l, _) = limiter(10.0, 0.1);
        let store = InMemorySnapshotStore::with_snapshot(Snapshot {
            version: 42,
            taken_at_millis: 0,
            entries: vec![],
        });
        assert_eq!(l.restore(&store).await, 0);
        assert_eq!(l.query_remaining("x", FG).unwrap(), Quota::from_units(10));
    }
}
