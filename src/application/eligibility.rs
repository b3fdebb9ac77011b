//! Available layaway limit from the membership tier and current exposure.

use super::engine::{LayawayEngine, require_access};
use crate::config::LimitPolicy;
use crate::domain::ids::{Actor, UserId};
use crate::domain::money::Money;
use crate::domain::ports::{LayawayStore, SavingsStore, TierStore};
use crate::error::Result;
use serde::Serialize;

/// A member's standing for a new layaway request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub has_active_membership: bool,
    pub savings_balance: Money,
    pub layaway_limit: Money,
    /// Sum of item values across open (not terminal) layaways.
    pub current_layaway_total: Money,
    pub available_layaway: Money,
    pub can_request: bool,
    pub message: String,
}

impl Eligibility {
    fn new(has_active_membership: bool, savings_balance: Money, limit: Money, exposure: Money) -> Self {
        let available = limit.saturating_sub(exposure);
        let can_request = has_active_membership && !available.is_zero();
        let message = if !has_active_membership {
            "An active membership is required to request a layaway.".to_string()
        } else if available.is_zero() {
            format!("Your layaway limit ({limit}) is already used by your current layaways.")
        } else {
            format!(
                "You can request a layaway up to {available} (item value) within your limit of {limit}."
            )
        };
        Self {
            has_active_membership,
            savings_balance,
            layaway_limit: limit,
            current_layaway_total: exposure,
            available_layaway: available,
            can_request,
            message,
        }
    }
}

impl LayawayEngine {
    pub async fn eligibility(&self, actor: &Actor, user: UserId) -> Result<Eligibility> {
        require_access(actor, user)?;
        self.compute_eligibility(user).await
    }

    /// Callers that go on to create a layaway must hold the user's lock.
    pub(crate) async fn compute_eligibility(&self, user: UserId) -> Result<Eligibility> {
        let membership = self.current_membership(user).await?;
        let savings = self
            .store()
            .account(user)
            .await?
            .map_or(Money::ZERO, |a| a.balance);

        let limit = match (self.policy().limit_policy, &membership) {
            (LimitPolicy::SavingsBalance, _) => self.policy().savings_limit(savings),
            (LimitPolicy::MembershipTier, Some(sub)) => self
                .store()
                .tier(sub.tier)
                .await?
                .map_or(Money::ZERO, |t| t.max_purchase_value),
            (LimitPolicy::MembershipTier, None) => Money::ZERO,
        };

        let exposure: Money = self
            .store()
            .layaways_for_user(user)
            .await?
            .iter()
            .filter(|l| l.status.is_open())
            .map(|l| l.item_value)
            .sum();

        Ok(Eligibility::new(membership.is_some(), savings, limit, exposure))
    }
}
