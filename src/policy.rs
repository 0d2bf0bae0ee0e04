//! Replenishment policy: pure functions over bucket state and category limits.

use std::time::Duration;

use crate::bucket::QuotaBucket;
use crate::category::CategoryLimits;
use crate::quota::Quota;

/// Budget available to `bucket` at `now_millis`, before any deduction.
///
/// Elapsed time is clamped at zero, so a clock that moved backwards grants nothing. The result
/// never exceeds the category capacity, including when the stored value is above a capacity that
/// was lowered after the bucket was written.
pub fn entitlement(bucket: &QuotaBucket, limits: &CategoryLimits, now_millis: u64) -> Quota {
    let capacity = limits.capacity().as_micros();
    let elapsed = now_millis.saturating_sub(bucket.last_updated_millis());
    let regained =
        u128::from(elapsed) * u128::from(limits.refill_rate_per_millis().as_micros());
    let total = u128::from(bucket.remaining().as_micros()) + regained;
    Quota::from_micros(total.min(u128::from(capacity)) as u64)
}

/// Minimum wait before `cost` becomes affordable for a bucket holding `available`, assuming no
/// other consumption: `ceil((cost - available) / rate)` milliseconds.
pub fn retry_after(available: Quota, cost: Quota, limits: &CategoryLimits) -> Duration {
    let deficit = cost.saturating_sub(available).as_micros();
    if deficit == 0 {
        return Duration::ZERO;
    }
    let rate = limits.refill_rate_per_millis().as_micros();
    let millis = deficit / rate + u64::from(deficit % rate != 0);
    Duration::from_millis(millis)
}

/// Outcome of applying one consume attempt to a bucket value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settlement {
    /// Value to store back into the bucket.
    pub next: QuotaBucket,
    /// `true` when the cost was deducted.
    pub allowed: bool,
    /// Budget before deduction.
    pub entitlement: Quota,
}

/// Decide a consume attempt against `current`.
///
/// Both outcomes advance the stored timestamp and persist the replenished amount, so a denied
/// request does not cause the next attempt to re-derive elapsed time from a stale timestamp.
/// The stored timestamp never moves backwards.
pub(crate) fn settle(
    current: &QuotaBucket,
    limits: &CategoryLimits,
    cost: Quota,
    now_millis: u64,
) -> Settlement {
    let available = entitlement(current, limits, now_millis);
    let stamp = now_millis.max(current.last_updated_millis());
    match available.checked_sub(cost) {
        Some(left) => Settlement {
            next: QuotaBucket::new(left, stamp),
            allowed: true,
            entitlement: available,
        },
        None => Settlement {
            next: QuotaBucket::new(available, stamp),
            allowed: false,
            entitlement: available,
        },
    }
}

impl Settlement {
    /// Wait before a denied `cost` becomes affordable, measured from `now_millis`.
    ///
    /// When the clock is behind the stored timestamp nothing is credited until it catches up, so
    /// that gap is added to the refill time.
    pub(crate) fn retry_after(
        &self,
        cost: Quota,
        limits: &CategoryLimits,
        now_millis: u64,
    ) -> Duration {
        let stalled = self.next.last_updated_millis().saturating_sub(now_millis);
        retry_after(self.entitlement, cost, limits).saturating_add(Duration::from_millis(stalled))
    }
}
