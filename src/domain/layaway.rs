use super::ids::{LayawayId, UserId};
use super::money::Money;
use crate::config::Policy;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayawayStatus {
    PendingConfirmation,
    CoolingOff,
    Active,
    Completed,
    Canceled,
    Defaulted,
}

impl LayawayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LayawayStatus::Completed | LayawayStatus::Canceled | LayawayStatus::Defaulted
        )
    }

    /// Statuses whose item value counts against the member's limit.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses in which payments may be reported and confirmed.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, LayawayStatus::Active | LayawayStatus::CoolingOff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// Pick up at the office, free of charge.
    #[default]
    Pickup,
    /// Delivered; the delivery fee is charged separately.
    Delivery,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SellerInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// Everything a member supplies when requesting a layaway.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayawayRequest {
    pub item_description: String,
    pub item_value: Money,
    pub collection_type: CollectionType,
    pub delivery_fee: Money,
    pub seller: SellerInfo,
}

impl LayawayRequest {
    pub fn new(item_value: Money) -> Self {
        Self {
            item_value,
            ..Default::default()
        }
    }
}

/// A reservation of an item paid off over a bounded period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layaway {
    pub id: LayawayId,
    pub user: UserId,
    pub item_description: String,
    pub item_value: Money,
    pub service_fee: Money,
    pub delivery_fee: Money,
    pub total: Money,
    pub status: LayawayStatus,
    pub collection_type: CollectionType,
    pub seller: SellerInfo,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration_days: Option<u32>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cooling_off_until: Option<DateTime<Utc>>,
    pub amount_paid: Money,
    pub cancellation_penalty: Money,
    pub default_penalty: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Layaway {
    pub fn new(
        user: UserId,
        request: LayawayRequest,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let item_value = Money::positive(request.item_value.value())
            .map_err(|_| Error::InvalidAmount("Item value must be positive.".to_string()))?;
        let mut layaway = Self {
            id: LayawayId::new(),
            user,
            item_description: request.item_description,
            item_value,
            service_fee: policy.service_fee(item_value),
            delivery_fee: request.delivery_fee,
            total: Money::ZERO,
            status: LayawayStatus::PendingConfirmation,
            collection_type: request.collection_type,
            seller: request.seller,
            start_date: None,
            end_date: None,
            duration_days: None,
            confirmed_at: None,
            cooling_off_until: None,
            amount_paid: Money::ZERO,
            cancellation_penalty: Money::ZERO,
            default_penalty: Money::ZERO,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        layaway.recompute_total()?;
        Ok(layaway)
    }

    /// Must run before every save. Fails with `InvalidAmount` if the
    /// parts do not fit in a `Money`; the total is left untouched then.
    pub fn recompute_total(&mut self) -> Result<()> {
        self.total = self
            .item_value
            .try_add(self.service_fee)?
            .try_add(self.delivery_fee)?;
        Ok(())
    }

    pub fn remaining(&self) -> Money {
        self.total.saturating_sub(self.amount_paid)
    }

    pub fn is_in_cooling_off(&self, now: DateTime<Utc>) -> bool {
        self.cooling_off_until.is_some_and(|until| now <= until)
            && matches!(
                self.status,
                LayawayStatus::CoolingOff | LayawayStatus::Active
            )
    }

    pub fn can_cancel_without_penalty(&self, now: DateTime<Utc>) -> bool {
        self.is_in_cooling_off(now) && self.status != LayawayStatus::Canceled
    }

    /// The operator secured the item; the cooling-off window starts now.
    pub fn confirm(&mut self, policy: &Policy, now: DateTime<Utc>) -> Result<()> {
        if self.status != LayawayStatus::PendingConfirmation {
            return Err(Error::InvalidState(
                "Only pending layaways can be confirmed.".to_string(),
            ));
        }
        self.confirmed_at = Some(now);
        self.cooling_off_until = Some(now + Duration::hours(policy.cooling_off_hours));
        self.status = LayawayStatus::CoolingOff;
        self.updated_at = now;
        Ok(())
    }

    pub fn activate(
        &mut self,
        duration_days: Option<u32>,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !matches!(
            self.status,
            LayawayStatus::CoolingOff | LayawayStatus::PendingConfirmation
        ) {
            return Err(Error::InvalidState(
                "Layaway must be in cooling-off or pending to activate.".to_string(),
            ));
        }
        let days = duration_days.unwrap_or(policy.layaway_max_days);
        if !(policy.layaway_min_days..=policy.layaway_max_days).contains(&days) {
            return Err(Error::InvalidDuration {
                days,
                min: policy.layaway_min_days,
                max: policy.layaway_max_days,
            });
        }
        let start = self.confirmed_at.unwrap_or(now);
        self.start_date = Some(start);
        self.end_date = Some(start + Duration::days(i64::from(days)));
        self.duration_days = Some(days);
        self.status = LayawayStatus::Active;
        if self.cooling_off_until.is_none() {
            self.cooling_off_until = Some(now + Duration::hours(policy.cooling_off_hours));
        }
        self.updated_at = now;
        Ok(())
    }

    /// Cancels a non-terminal layaway. The penalty is waived inside the
    /// cooling-off window or when `apply_penalty` is false.
    pub fn cancel(&mut self, apply_penalty: bool, policy: &Policy, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidState(
                "This layaway cannot be canceled.".to_string(),
            ));
        }
        if apply_penalty && !self.can_cancel_without_penalty(now) {
            self.cancellation_penalty = policy.cancellation_penalty;
        }
        self.status = LayawayStatus::Canceled;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != LayawayStatus::Active {
            return Err(Error::InvalidState(
                "Only active layaways can be completed.".to_string(),
            ));
        }
        if self.amount_paid < self.total {
            return Err(Error::InsufficientPayment {
                paid: self.amount_paid,
                total: self.total,
            });
        }
        self.status = LayawayStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Payment not completed in time: the item returns to market.
    pub fn mark_defaulted(&mut self, policy: &Policy, now: DateTime<Utc>) -> Result<()> {
        if self.status != LayawayStatus::Active {
            return Err(Error::InvalidState(
                "Only active layaways can be marked defaulted.".to_string(),
            ));
        }
        self.status = LayawayStatus::Defaulted;
        self.default_penalty = policy.default_penalty;
        self.updated_at = now;
        Ok(())
    }

    /// Active, past its end date and not paid in full.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LayawayStatus::Active
            && self.end_date.is_some_and(|end| end <= now)
            && self.amount_paid < self.total
    }

    /// Adds a confirmed payment; completes the layaway once fully paid.
    pub fn apply_payment(&mut self, amount: Money, now: DateTime<Utc>) -> Result<()> {
        if !self.status.accepts_payments() {
            return Err(Error::InvalidState(
                "Payments can only be confirmed for active or cooling-off layaways.".to_string(),
            ));
        }
        let paid = match self.amount_paid.checked_add(amount) {
            Some(paid) if paid <= self.total => paid,
            _ => {
                return Err(Error::ExceedsBalance {
                    amount,
                    paid: self.amount_paid,
                    total: self.total,
                });
            }
        };
        self.amount_paid = paid;
        self.updated_at = now;
        if self.status == LayawayStatus::Active && self.amount_paid >= self.total {
            self.mark_completed(now)?;
        }
        Ok(())
    }
}
