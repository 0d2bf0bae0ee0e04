#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # quotawarden
//!
//! Per-caller, per-category quota rate limiting for services shared by many client
//! applications.
//!
//! ## Features
//!
//! - **Exact accounting**: budgets are fixed-point, so long uptimes never drift
//! - **Per-bucket locking** over a sharded store; distinct callers only wait on each other when
//!   their keys share a shard and that shard is being restructured
//! - **Lazy buckets** created at full capacity and evicted when idle or retired
//! - **Backward clock safety**: time going backwards grants nothing
//! - **Snapshot persistence** through a pluggable [`SnapshotStore`], with a background
//!   [`Checkpointer`]
//! - **Live limits** updated without pausing traffic
//! - **Tower middleware** via [`QuotaLayer`]
//!
//! ## Quick Start
//!
//! ```rust
//! use quotawarden::{CategoryLimits, QuotaCategory, RateLimiter, RateLimiterConfig};
//!
//! let config = RateLimiterConfig::builder()
//!     .limit(QuotaCategory::ForegroundCall, CategoryLimits::new(100.0, 1.0).unwrap())
//!     .build()
//!     .unwrap();
//! let limiter = RateLimiter::new(config).unwrap();
//!
//! let decision = limiter.try_consume("com.example.app", QuotaCategory::ForegroundCall, 1.0).unwrap();
//! if let Some(wait) = decision.retry_after() {
//!     println!("slow down, retry in {:?}", wait);
//! }
//! ```

pub mod adaptive;
pub mod bucket;
pub mod category;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod persistence;
pub mod policy;
pub mod prelude;
pub mod quota;
pub mod store;

// Re-exports
pub use adaptive::LiveLimits;
pub use bucket::{BucketKey, CallerId, QuotaBucket};
pub use category::{CategoryLimits, QuotaCategory};
pub use checkpoint::{CheckpointStats, Checkpointer};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{LimitTable, RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::{ConfigError, ContractViolation, PersistenceError, QuotaError};
pub use limiter::{Decision, RateLimiter};
pub use middleware::{QuotaClaim, QuotaLayer, QuotaService};
pub use persistence::{InMemorySnapshotStore, Snapshot, SnapshotEntry, SnapshotStore};
pub use quota::Quota;
pub use store::BucketStore;
