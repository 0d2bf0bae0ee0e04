//! Convenient re-exports for common quotawarden types.
pub use crate::{
    category::{CategoryLimits, QuotaCategory},
    clock::{Clock, ManualClock, SystemClock},
    config::RateLimiterConfig,
    error::{ContractViolation, PersistenceError, QuotaError},
    limiter::{Decision, RateLimiter},
    middleware::{QuotaClaim, QuotaLayer},
    persistence::{Snapshot, SnapshotStore},
    quota::Quota,
    Checkpointer,
};
