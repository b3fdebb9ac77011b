use super::ids::{SubscriptionId, TierId, UserId};
use super::money::Money;
use super::tier::MembershipTier;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Paid,
    Active,
    Expired,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    MobileMoney,
    Cash,
    Bank,
}

impl PaymentMode {
    /// Mobile money and bank transfers must carry a transaction reference.
    pub fn requires_reference(&self) -> bool {
        matches!(self, PaymentMode::MobileMoney | PaymentMode::Bank)
    }
}

/// Payment details a member supplies with a membership request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub mode: Option<PaymentMode>,
    pub reference: Option<String>,
    pub amount: Option<Money>,
}

impl PaymentInfo {
    pub fn new(mode: PaymentMode, reference: Option<&str>, amount: Money) -> Self {
        Self {
            mode: Some(mode),
            reference: reference.map(str::to_string),
            amount: Some(amount),
        }
    }

    /// Request-time checks: complete payment details matching the tier price.
    pub fn validate_for(&self, price: Money) -> Result<()> {
        let mode = self
            .mode
            .ok_or_else(|| Error::Validation("Payment mode is required.".to_string()))?;
        if mode.requires_reference() && !has_text(&self.reference) {
            return Err(Error::Validation(
                "Payment reference is required for Mobile Money and Bank payments.".to_string(),
            ));
        }
        match self.amount {
            None | Some(Money::ZERO) => Err(Error::Validation(
                "Amount paid is required.".to_string(),
            )),
            Some(amount) if amount != price => Err(Error::InvalidAmount(format!(
                "Amount paid must match the membership price of {price}."
            ))),
            Some(_) => Ok(()),
        }
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// A member's subscription to a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipSubscription {
    pub id: SubscriptionId,
    pub user: UserId,
    pub tier: TierId,
    pub status: MembershipStatus,
    pub payment_mode: Option<PaymentMode>,
    pub payment_reference: Option<String>,
    pub amount_paid: Option<Money>,
    pub confirmed_by: Option<UserId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl MembershipSubscription {
    /// Opens a pending request for `tier`.
    pub fn request(
        user: UserId,
        tier: &MembershipTier,
        payment: PaymentInfo,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !tier.is_available {
            return Err(Error::TierUnavailable);
        }
        payment.validate_for(tier.price)?;
        Ok(Self {
            id: SubscriptionId::new(),
            user,
            tier: tier.id,
            status: MembershipStatus::Pending,
            payment_mode: payment.mode,
            payment_reference: payment.reference,
            amount_paid: payment.amount,
            confirmed_by: None,
            confirmed_at: None,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Replaces the payment details of a still-pending request.
    pub fn update_payment(
        &mut self,
        payment: PaymentInfo,
        price: Money,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != MembershipStatus::Pending {
            return Err(Error::InvalidState(
                "Only pending memberships can be updated.".to_string(),
            ));
        }
        payment.validate_for(price)?;
        self.payment_mode = payment.mode;
        self.payment_reference = payment.reference;
        self.amount_paid = payment.amount;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_paid(&mut self, operator: UserId, now: DateTime<Utc>) -> Result<()> {
        if self.status != MembershipStatus::Pending {
            return Err(Error::InvalidState(
                "Only pending memberships can be marked as paid.".to_string(),
            ));
        }
        self.status = MembershipStatus::Paid;
        self.confirmed_by = Some(operator);
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Starts the validity period. Expiring the user's other active
    /// subscriptions is the caller's job and must commit with this change.
    pub fn activate(&mut self, operator: UserId, duration_days: u32, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.status, MembershipStatus::Pending | MembershipStatus::Paid) {
            return Err(Error::InvalidState(
                "Membership must be pending or paid before activation.".to_string(),
            ));
        }
        self.status = MembershipStatus::Active;
        self.start_date = Some(now);
        self.end_date = Some(now + Duration::days(i64::from(duration_days)));
        self.confirmed_by = Some(operator);
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.status, MembershipStatus::Pending | MembershipStatus::Paid) {
            return Err(Error::InvalidState(
                "Only pending or paid memberships can be canceled.".to_string(),
            ));
        }
        self.status = MembershipStatus::Canceled;
        self.end_date = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Returns true when the subscription transitioned to expired.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.end_date {
            Some(end) if self.status == MembershipStatus::Active && end <= now => {
                self.status = MembershipStatus::Expired;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Superseded by another activation: ends immediately.
    pub fn supersede(&mut self, now: DateTime<Utc>) {
        self.status = MembershipStatus::Expired;
        self.end_date = Some(now);
        self.updated_at = now;
    }

    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active && self.end_date.is_some_and(|end| end > now)
    }

    pub fn is_history(&self) -> bool {
        matches!(
            self.status,
            MembershipStatus::Expired | MembershipStatus::Canceled
        )
    }

    /// Row-level invariants checked before any state change is persisted.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.status, MembershipStatus::Paid | MembershipStatus::Active) {
            let mode = self
                .payment_mode
                .ok_or_else(|| Error::Validation("Payment mode is required.".to_string()))?;
            if mode.requires_reference() && !has_text(&self.payment_reference) {
                return Err(Error::Validation(
                    "Payment reference is required for Mobile Money or Bank payments.".to_string(),
                ));
            }
            if self.amount_paid.is_none_or(|a| a.is_zero()) {
                return Err(Error::Validation("Amount paid is required.".to_string()));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start >= end
        {
            return Err(Error::Validation(
                "End date must be after start date.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier() -> MembershipTier {
        MembershipTier::new("Basic", Money::new(10_000), Money::new(30_000))
    }

    fn pending(now: DateTime<Utc>) -> MembershipSubscription {
        MembershipSubscription::request(
            UserId::new(),
            &tier(),
            PaymentInfo::new(PaymentMode::Cash, None, Money::new(10_000)),
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_request_validates_payment() {
        let now = Utc::now();
        let tier = tier();
        let user = UserId::new();

        let missing_mode = PaymentInfo {
            amount: Some(Money::new(10_000)),
            ..Default::default()
        };
        assert!(matches!(
            MembershipSubscription::request(user, &tier, missing_mode, now),
            Err(Error::Validation(_))
        ));

        let no_reference = PaymentInfo::new(PaymentMode::MobileMoney, Some("  "), Money::new(10_000));
        assert!(matches!(
            MembershipSubscription::request(user, &tier, no_reference, now),
            Err(Error::Validation(_))
        ));

        let wrong_amount = PaymentInfo::new(PaymentMode::Bank, Some("SLIP-1"), Money::new(9_999));
        assert!(matches!(
            MembershipSubscription::request(user, &tier, wrong_amount, now),
            Err(Error::InvalidAmount(_))
        ));

        let ok = PaymentInfo::new(PaymentMode::Bank, Some("SLIP-1"), Money::new(10_000));
        let sub = MembershipSubscription::request(user, &tier, ok, now).unwrap();
        assert_eq!(sub.status, MembershipStatus::Pending);
    }

    #[test]
    fn test_request_rejects_unavailable_tier() {
        let mut tier = tier();
        tier.is_available = false;
        let result = MembershipSubscription::request(
            UserId::new(),
            &tier,
            PaymentInfo::new(PaymentMode::Cash, None, Money::new(10_000)),
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::TierUnavailable)));
    }

    #[test]
    fn test_mark_paid_only_from_pending() {
        let now = Utc::now();
        let operator = UserId::new();
        let mut sub = pending(now);
        sub.mark_paid(operator, now).unwrap();
        assert_eq!(sub.status, MembershipStatus::Paid);
        assert_eq!(sub.confirmed_by, Some(operator));
        assert!(matches!(
            sub.mark_paid(operator, now),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_activate_sets_validity_window() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.activate(UserId::new(), 365, now).unwrap();
        assert_eq!(sub.status, MembershipStatus::Active);
        assert_eq!(sub.start_date, Some(now));
        assert_eq!(sub.end_date, Some(now + Duration::days(365)));
        assert!(sub.is_currently_active(now));
        assert!(!sub.is_currently_active(now + Duration::days(365)));
        sub.validate().unwrap();
    }

    #[test]
    fn test_activate_rejects_terminal_states() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.cancel(now).unwrap();
        assert!(matches!(
            sub.activate(UserId::new(), 365, now),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_cancel_only_pending_or_paid() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.activate(UserId::new(), 365, now).unwrap();
        assert!(matches!(sub.cancel(now), Err(Error::InvalidState(_))));

        let mut paid = pending(now);
        paid.mark_paid(UserId::new(), now).unwrap();
        paid.cancel(now).unwrap();
        assert_eq!(paid.status, MembershipStatus::Canceled);
        assert_eq!(paid.end_date, Some(now));
    }

    #[test]
    fn test_expire_if_due_is_idempotent() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.activate(UserId::new(), 30, now).unwrap();

        assert!(!sub.expire_if_due(now + Duration::days(29)));
        assert!(sub.expire_if_due(now + Duration::days(30)));
        assert_eq!(sub.status, MembershipStatus::Expired);
        assert!(!sub.expire_if_due(now + Duration::days(31)));
    }

    #[test]
    fn test_validate_requires_payment_for_paid_states() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.status = MembershipStatus::Paid;
        sub.payment_mode = None;
        assert!(matches!(sub.validate(), Err(Error::Validation(_))));

        sub.payment_mode = Some(PaymentMode::MobileMoney);
        sub.payment_reference = None;
        assert!(matches!(sub.validate(), Err(Error::Validation(_))));

        sub.payment_reference = Some("MM-42".to_string());
        sub.amount_paid = None;
        assert!(matches!(sub.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_date_order() {
        let now = Utc::now();
        let mut sub = pending(now);
        sub.start_date = Some(now);
        sub.end_date = Some(now);
        assert!(matches!(sub.validate(), Err(Error::Validation(_))));
    }
}
