//! Money value object.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) to avoid floating point issues.
///
/// The currency is tracked separately on the owning entity; `Money` is just
/// the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units (e.g., 5000 = 50.00).
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds another amount, saturating at `i64::MAX`.
    pub fn add(&self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Subtracts another amount, saturating at `i64::MIN`.
    pub fn subtract(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
    }
}
