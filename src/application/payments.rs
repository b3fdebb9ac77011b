//! Member-reported payments and their operator confirmation.

use super::engine::{LayawayEngine, require_operator};
use crate::domain::ids::{Actor, LayawayId, PaymentId};
use crate::domain::layaway::Layaway;
use crate::domain::money::Money;
use crate::domain::payment::LayawayPayment;
use crate::domain::ports::{Changeset, LayawayStore};
use crate::error::{Error, Result};

impl LayawayEngine {
    /// Records a payment the member says they made. Nothing moves until an
    /// operator confirms it.
    pub async fn report_payment(
        &self,
        actor: &Actor,
        layaway: LayawayId,
        amount: Money,
        reference: Option<String>,
    ) -> Result<LayawayPayment> {
        let amount = Money::positive(amount.value())?;
        let owner = self.layaway(actor, layaway).await?.user;
        let _guard = self.lock_user(owner).await;
        let target = self.fetch_layaway(layaway).await?;

        if !target.status.accepts_payments() {
            return Err(Error::InvalidState(
                "Payments can only be reported for active or cooling-off layaways.".to_string(),
            ));
        }
        let remaining = target.remaining();
        if amount > remaining {
            return Err(Error::ExceedsRemaining { amount, remaining });
        }

        let mut payment = LayawayPayment::report(layaway, amount, reference, self.now());
        let mut changes = Changeset::new();
        changes.put_payment(&mut payment);
        self.commit(changes).await?;
        tracing::info!(payment = %payment.id, layaway = %layaway, amount = %amount, "payment reported");
        Ok(payment)
    }

    /// Confirms a reported payment and applies it to its layaway in one
    /// commit, completing an active layaway that becomes fully paid.
    ///
    /// # Errors
    ///
    /// `AlreadyConfirmed`, then `InvalidState` unless the layaway is active
    /// or cooling off, then `ExceedsBalance` when the payment would push
    /// the amount paid above the total. Nothing is written on failure.
    pub async fn confirm_payment(
        &self,
        actor: &Actor,
        id: PaymentId,
    ) -> Result<(LayawayPayment, Layaway)> {
        require_operator(actor)?;
        let layaway_id = self.fetch_payment(id).await?.layaway;
        let owner = self.fetch_layaway(layaway_id).await?.user;

        let _guard = self.lock_user(owner).await;
        let mut payment = self.fetch_payment(id).await?;
        let mut layaway = self.fetch_layaway(layaway_id).await?;
        let now = self.now();

        payment.confirm(actor.user, now)?;
        layaway.apply_payment(payment.amount, now)?;

        let mut changes = Changeset::new();
        changes.put_payment(&mut payment).put_layaway(&mut layaway)?;
        self.commit(changes).await?;
        tracing::info!(
            payment = %id,
            layaway = %layaway.id,
            amount = %payment.amount,
            paid = %layaway.amount_paid,
            total = %layaway.total,
            status = ?layaway.status,
            "payment confirmed"
        );
        Ok((payment, layaway))
    }

    async fn fetch_payment(&self, id: PaymentId) -> Result<LayawayPayment> {
        self.store()
            .payment(id)
            .await?
            .ok_or_else(|| Error::not_found("payment", id))
    }

    /// Payments reported against a layaway, oldest first.
    pub async fn list_payments(
        &self,
        actor: &Actor,
        layaway: LayawayId,
    ) -> Result<Vec<LayawayPayment>> {
        self.layaway(actor, layaway).await?;
        let mut payments = self.store().payments_for_layaway(layaway).await?;
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }
}
