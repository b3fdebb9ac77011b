use super::ids::{LayawayId, PaymentId, UserId};
use super::money::Money;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed_by: UserId,
    pub confirmed_at: DateTime<Utc>,
}

/// A payment reported by a member against a layaway.
///
/// There is no status field: a payment is unconfirmed until an operator
/// stamps a [`Confirmation`] on it, which happens exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayawayPayment {
    pub id: PaymentId,
    pub layaway: LayawayId,
    pub amount: Money,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmation: Option<Confirmation>,
    #[serde(default)]
    pub version: u64,
}

impl LayawayPayment {
    pub fn report(
        layaway: LayawayId,
        amount: Money,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            layaway,
            amount,
            reference: reference.filter(|r| !r.trim().is_empty()),
            created_at: now,
            confirmation: None,
            version: 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation.is_some()
    }

    pub fn confirm(&mut self, confirmed_by: UserId, now: DateTime<Utc>) -> Result<()> {
        if self.is_confirmed() {
            return Err(Error::AlreadyConfirmed);
        }
        self.confirmation = Some(Confirmation {
            confirmed_by,
            confirmed_at: now,
        });
        Ok(())
    }
}
