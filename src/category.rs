//! Quota categories and their per-category limits.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::quota::Quota;

/// Class of operation that draws from its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCategory {
    /// API calls made while the caller is in the foreground.
    ForegroundCall,
    /// API calls made while the caller runs in the background.
    BackgroundCall,
    /// Operations that write data into the store; cost is usually a byte or record count.
    DataWrite,
    /// Never limited. Requests in this category are always allowed and never create a bucket.
    Unmetered,
}

impl QuotaCategory {
    /// All categories, in declaration order.
    pub const ALL: [QuotaCategory; 4] = [
        QuotaCategory::ForegroundCall,
        QuotaCategory::BackgroundCall,
        QuotaCategory::DataWrite,
        QuotaCategory::Unmetered,
    ];

    /// Stable lowercase name, also used as the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaCategory::ForegroundCall => "foreground_call",
            QuotaCategory::BackgroundCall => "background_call",
            QuotaCategory::DataWrite => "data_write",
            QuotaCategory::Unmetered => "unmetered",
        }
    }

    /// Whether requests in this category are subject to a budget at all.
    pub fn is_metered(&self) -> bool {
        !matches!(self, QuotaCategory::Unmetered)
    }
}

impl fmt::Display for QuotaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated budget configuration for one category.
///
/// `capacity` is the most a bucket can hold; `refill_rate_per_millis` is how much it regains per
/// elapsed millisecond. Both are fixed-point [`Quota`] amounts, so a rate of `0.1` units/ms is
/// stored exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCategoryLimits", into = "RawCategoryLimits")]
pub struct CategoryLimits {
    capacity: Quota,
    refill_rate_per_millis: Quota,
}

impl CategoryLimits {
    /// Create limits with validation. Both values must be finite and strictly positive.
    ///
    /// # Examples
    /// ```
    /// use quotawarden::CategoryLimits;
    /// let limits = CategoryLimits::new(10.0, 0.1).unwrap();
    /// assert_eq!(limits.capacity().as_f64(), 10.0);
    /// assert!(CategoryLimits::new(0.0, 1.0).is_err());
    /// ```
    pub fn new(capacity: f64, refill_rate_per_millis: f64) -> Result<Self, ConfigError> {
        let capacity = Quota::from_f64(capacity)
            .filter(|q| !q.is_zero())
            .ok_or(ConfigError::InvalidCapacity(capacity))?;
        let refill = Quota::from_f64(refill_rate_per_millis)
            .filter(|q| !q.is_zero())
            .ok_or(ConfigError::InvalidRefillRate(refill_rate_per_millis))?;
        Ok(Self { capacity, refill_rate_per_millis: refill })
    }

    /// Create limits from fixed-point amounts; both must be non-zero.
    pub fn from_quota(capacity: Quota, refill_rate_per_millis: Quota) -> Result<Self, ConfigError> {
        if capacity.is_zero() {
            return Err(ConfigError::InvalidCapacity(0.0));
        }
        if refill_rate_per_millis.is_zero() {
            return Err(ConfigError::InvalidRefillRate(0.0));
        }
        Ok(Self { capacity, refill_rate_per_millis })
    }

    /// `capacity` units that regenerate completely over `window`.
    ///
    /// The per-millisecond rate is rounded up to the next micro-unit, so a drained bucket is
    /// never slower than the window to refill.
    pub fn per_window(capacity: u64, window: Duration) -> Result<Self, ConfigError> {
        let window_ms = window.as_millis();
        if window_ms == 0 {
            return Err(ConfigError::InvalidRefillRate(f64::INFINITY));
        }
        let capacity_q = Quota::from_units(capacity);
        let micros = u128::from(capacity_q.as_micros());
        let rate = (micros + window_ms - 1) / window_ms;
        let rate = u64::try_from(rate).unwrap_or(u64::MAX);
        Self::from_quota(capacity_q, Quota::from_micros(rate))
            .map_err(|_| ConfigError::InvalidCapacity(capacity as f64))
    }

    /// Maximum budget a bucket may hold.
    pub fn capacity(&self) -> Quota {
        self.capacity
    }

    /// Budget regenerated per elapsed millisecond.
    pub fn refill_rate_per_millis(&self) -> Quota {
        self.refill_rate_per_millis
    }

    /// Milliseconds needed for an empty bucket to fill completely.
    pub fn full_refill_millis(&self) -> u64 {
        let rate = self.refill_rate_per_millis.as_micros();
        self.capacity.as_micros() / rate + u64::from(self.capacity.as_micros() % rate != 0)
    }
}

/// Serialized form of [`CategoryLimits`]: plain units, validated on the way in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawCategoryLimits {
    capacity: f64,
    refill_rate_per_millis: f64,
}

impl TryFrom<RawCategoryLimits> for CategoryLimits {
    type Error = ConfigError;

    fn try_from(raw: RawCategoryLimits) -> Result<Self, Self::Error> {
        CategoryLimits::new(raw.capacity, raw.refill_rate_per_millis)
    }
}

impl From<CategoryLimits> for RawCategoryLimits {
    fn from(limits: CategoryLimits) -> Self {
        Self {
            capacity: limits.capacity.as_f64(),
            refill_rate_per_millis: limits.refill_rate_per_millis.as_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_or_non_finite() {
        assert!(matches!(CategoryLimits::new(0.0, 1.0), Err(ConfigError::InvalidCapacity(_))));
        assert!(matches!(CategoryLimits::new(-5.0, 1.0), Err(ConfigError::InvalidCapacity(_))));
        assert!(matches!(
            CategoryLimits::new(10.0, f64::NAN),
            Err(ConfigError::InvalidRefillRate(_))
        ));
        assert!(matches!(CategoryLimits::new(10.0, 0.0), Err(ConfigError::InvalidRefillRate(_))));
    }

    #[test]
    fn per_window_rounds_rate_up() {
        // 1000 units over 15 minutes
        let limits = CategoryLimits::per_window(1000, Duration::from_secs(900)).unwrap();
        assert_eq!(limits.capacity(), Quota::from_units(1000));
        // 1_000_000_000 micros / 900_000 ms = 1111.11.. -> 1112
        assert_eq!(limits.refill_rate_per_millis(), Quota::from_micros(1112));
        assert!(limits.full_refill_millis() <= 900_000);
    }

    #[test]
    fn per_window_rejects_zero_window() {
        assert!(CategoryLimits::per_window(10, Duration::ZERO).is_err());
    }

    #[test]
    fn serde_uses_plain_units() {
        let limits = CategoryLimits::new(10.0, 0.1).unwrap();
        let json = serde_json::to_string(&limits).unwrap();
        assert_eq!(json, r#"{"capacity":10.0,"refill_rate_per_millis":0.1}"#);
        let back: CategoryLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }

    #[test]
    fn serde_rejects_invalid_limits() {
        let err = serde_json::from_str::<CategoryLimits>(
            r#"{"capacity":0.0,"refill_rate_per_millis":1.0}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn category_names_are_stable() {
        assert_eq!(QuotaCategory::DataWrite.to_string(), "data_write");
        assert_eq!(
            serde_json::to_string(&QuotaCategory::BackgroundCall).unwrap(),
            r#""background_call""#
        );
        assert!(!QuotaCategory::Unmetered.is_metered());
    }
}
