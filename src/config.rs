//! Business constants of the program, overridable from a JSON file.

use crate::domain::money::Money;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the Eligibility Engine derives a member's layaway limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// The active membership tier's maximum purchase value.
    #[default]
    MembershipTier,
    /// Stepped table keyed on the savings balance.
    SavingsBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub cooling_off_hours: i64,
    pub layaway_min_days: u32,
    pub layaway_max_days: u32,
    pub service_fee_flat_threshold: Money,
    pub service_fee_flat_amount: Money,
    pub service_fee_percent: u64,
    pub cancellation_penalty: Money,
    pub default_penalty: Money,
    pub limit_policy: LimitPolicy,
    /// Maximum number of ledger entries returned by a listing.
    pub transaction_page_size: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            cooling_off_hours: 48,
            layaway_min_days: 14,
            layaway_max_days: 30,
            service_fee_flat_threshold: Money::new(50_000),
            service_fee_flat_amount: Money::new(5_000),
            service_fee_percent: 10,
            cancellation_penalty: Money::new(10_000),
            default_penalty: Money::new(10_000),
            limit_policy: LimitPolicy::MembershipTier,
            transaction_page_size: 100,
        }
    }
}

impl Policy {
    /// Loads a policy from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Items at or below the threshold pay the flat fee, above it a percentage.
    pub fn service_fee(&self, item_value: Money) -> Money {
        if item_value <= self.service_fee_flat_threshold {
            self.service_fee_flat_amount
        } else {
            item_value.percent(self.service_fee_percent)
        }
    }

    /// Savings-based limit table used by [`LimitPolicy::SavingsBalance`].
    pub fn savings_limit(&self, savings: Money) -> Money {
        match savings.value() {
            0 => Money::new(30_000),
            v @ 1..=30_000 => Money::new(2 * v),
            30_001..=60_000 => Money::new(80_000),
            _ => Money::new(120_000),
        }
    }
}
