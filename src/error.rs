//! Error types for the limiter, its configuration and persistence.
use std::fmt;
use std::time::Duration;

use crate::category::QuotaCategory;

/// A request the integrating layer should never have made.
///
/// Returned before any bucket state is touched. Seeing one at runtime means an upstream bug, not
/// a caller that ran out of budget.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ContractViolation {
    /// Caller identity was empty or whitespace.
    #[error("caller id must not be empty")]
    EmptyCallerId,
    /// The category has no configured limits.
    #[error("no limits configured for category {0}")]
    UnknownCategory(QuotaCategory),
    /// Cost was negative, NaN, or infinite.
    #[error("cost must be a finite non-negative number, got {0}")]
    InvalidCost(f64),
}

/// Invalid limiter configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Capacity must be finite and strictly positive.
    #[error("capacity must be finite and > 0, got {0}")]
    InvalidCapacity(f64),
    /// Refill rate must be finite and strictly positive.
    #[error("refill rate must be finite and > 0 units/ms, got {0}")]
    InvalidRefillRate(f64),
    /// The bucket store needs at least one shard.
    #[error("shard count must be > 0")]
    ZeroShards,
    /// Checkpoint interval must be non-zero.
    #[error("checkpoint interval must be > 0")]
    ZeroCheckpointInterval,
}

/// Failure of the persistence collaborator.
///
/// Never surfaced to request-handling callers; the limiter logs it and carries on with its
/// in-memory state.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum PersistenceError {
    /// Underlying I/O failed.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot bytes could not be encoded or decoded.
    #[error("snapshot format: {0}")]
    Format(#[from] serde_json::Error),
    /// Snapshot written by an incompatible version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    /// Backend-specific failure.
    #[error("snapshot backend: {0}")]
    Backend(String),
}

/// Error surfaced by [`QuotaService`](crate::middleware::QuotaService).
#[derive(Debug, Clone)]
pub enum QuotaError<E> {
    /// The caller's budget for the category is exhausted.
    RateLimited { retry_after: Duration },
    /// The request could not be mapped to a valid claim.
    Contract(ContractViolation),
    /// The wrapped service failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for QuotaError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { retry_after } => {
                write!(f, "rate limited; retry after {:?}", retry_after)
            }
            Self::Contract(v) => write!(f, "quota contract violation: {}", v),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for QuotaError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Contract(v) => Some(v),
            Self::RateLimited { .. } => None,
        }
    }
}

impl<E> From<ContractViolation> for QuotaError<E> {
    fn from(v: ContractViolation) -> Self {
        Self::Contract(v)
    }
}

impl<E> QuotaError<E> {
    /// Check if this error is a rate-limit denial
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is a contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Suggested wait before retrying, for denials.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
