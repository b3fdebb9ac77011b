use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// A non-negative whole-unit amount of the program currency.
///
/// Every persisted value (prices, limits, fees, balances, payments) is a
/// `Money`; there are no fractional amounts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Validates an input amount that must be strictly positive.
    pub fn positive(value: u64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidAmount("Amount must be positive".to_string()))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// `checked_add` that reports overflow as `InvalidAmount`.
    pub fn try_add(self, rhs: Self) -> Result<Self> {
        self.checked_add(rhs)
            .ok_or_else(|| Error::InvalidAmount(format!("{self} + {rhs} is out of range")))
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// `floor(self * percent / 100)`.
    pub fn percent(self, percent: u64) -> Self {
        let scaled = u128::from(self.0) * u128::from(percent) / 100;
        Self(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Signed ledger representation of a credit.
    pub fn as_credit(self) -> Result<i64> {
        i64::try_from(self.0)
            .map_err(|_| Error::InvalidAmount(format!("{self} is out of ledger range")))
    }
}

// Saturates; only used for exposure totals, compared against limits.
impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Money::saturating_add)
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// 1234567 -> "1,234,567"
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        f.write_str(&grouped)
    }
}
