//! Bucket identity and bucket state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::QuotaCategory;
use crate::quota::Quota;

/// Stable identity of a caller, e.g. an application package name.
///
/// Cheap to clone; the string is shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(Arc<str>);

impl CallerId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only identities are never valid callers.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CallerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Lookup key of a bucket: one per (caller, category).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    caller: CallerId,
    category: QuotaCategory,
}

impl BucketKey {
    pub fn new(caller: impl Into<CallerId>, category: QuotaCategory) -> Self {
        Self { caller: caller.into(), category }
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    pub fn category(&self) -> QuotaCategory {
        self.category
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.caller, self.category)
    }
}

/// State of one bucket at the instant it was last written.
///
/// Values are replaced wholesale: every update builds a new `QuotaBucket` and stores it in place
/// of the old one while the bucket's lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaBucket {
    remaining: Quota,
    last_updated_millis: u64,
}

impl QuotaBucket {
    pub const fn new(remaining: Quota, last_updated_millis: u64) -> Self {
        Self { remaining, last_updated_millis }
    }

    /// A bucket holding its whole capacity as of `now_millis`.
    pub const fn full(capacity: Quota, now_millis: u64) -> Self {
        Self::new(capacity, now_millis)
    }

    pub const fn remaining(&self) -> Quota {
        self.remaining
    }

    pub const fn last_updated_millis(&self) -> u64 {
        self.last_updated_millis
    }
}
