//! Fixed-point quota amounts.
//!
//! Budgets, costs and refill rates are stored as whole micro-units in a `u64`. Replenishment then
//! becomes integer arithmetic, so millions of tiny increments over a long uptime never drift the
//! way repeated `f64` additions would.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of micro-units in one unit of quota.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// A non-negative amount of quota with six fractional digits of precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quota(u64);

impl Quota {
    /// No quota.
    pub const ZERO: Quota = Quota(0);
    /// Largest representable amount.
    pub const MAX: Quota = Quota(u64::MAX);

    /// Build from raw micro-units.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Build from a whole number of units, saturating at [`Quota::MAX`].
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(MICROS_PER_UNIT))
    }

    /// Convert a floating-point amount, rounding to the nearest micro-unit.
    ///
    /// Returns `None` for negative, NaN, infinite, or unrepresentably large values.
    pub fn from_f64(units: f64) -> Option<Self> {
        if !units.is_finite() || units < 0.0 {
            return None;
        }
        let micros = (units * MICROS_PER_UNIT as f64).round();
        if micros >= u64::MAX as f64 {
            return None;
        }
        Some(Self(micros as u64))
    }

    /// Raw micro-units.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Lossy conversion for display and metrics.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }

    /// Returns `true` when the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn saturating_add(self, rhs: Quota) -> Quota {
        Quota(self.0.saturating_add(rhs.0))
    }

    pub const fn saturating_sub(self, rhs: Quota) -> Quota {
        Quota(self.0.saturating_sub(rhs.0))
    }

    pub const fn checked_sub(self, rhs: Quota) -> Option<Quota> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Quota(v)),
            None => None,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MICROS_PER_UNIT;
        let frac = self.0 % MICROS_PER_UNIT;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:06}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}
