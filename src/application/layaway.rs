use super::engine::{LayawayEngine, SweepReport, require_access, require_operator};
use crate::domain::ids::{Actor, LayawayId, UserId};
use crate::domain::layaway::{Layaway, LayawayRequest, LayawayStatus};
use crate::domain::ports::{Changeset, LayawayStore};
use crate::error::{Error, Result};

impl LayawayEngine {
    pub(crate) async fn fetch_layaway(&self, id: LayawayId) -> Result<Layaway> {
        self.store()
            .layaway(id)
            .await?
            .ok_or_else(|| Error::not_found("layaway", id))
    }

    /// Reads a layaway the caller may see. Other members' layaways look
    /// missing rather than forbidden.
    pub async fn layaway(&self, actor: &Actor, id: LayawayId) -> Result<Layaway> {
        let layaway = self.fetch_layaway(id).await?;
        if actor.can_access(layaway.user) {
            Ok(layaway)
        } else {
            Err(Error::not_found("layaway", id))
        }
    }

    /// Every layaway of `user`, newest first.
    pub async fn list_layaways(&self, actor: &Actor, user: UserId) -> Result<Vec<Layaway>> {
        require_access(actor, user)?;
        let mut layaways = self.store().layaways_for_user(user).await?;
        layaways.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(layaways)
    }

    /// Opens a layaway awaiting operator confirmation, gated by the
    /// member's eligibility.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for a zero item value, `NotEligible` without an
    /// active membership or remaining limit, `LimitExceeded` when the item
    /// is worth more than the remaining limit.
    pub async fn create_layaway(
        &self,
        actor: &Actor,
        user: UserId,
        request: LayawayRequest,
    ) -> Result<Layaway> {
        require_access(actor, user)?;
        let requested = request.item_value;
        let mut layaway = Layaway::new(user, request, self.policy(), self.now())?;

        let _guard = self.lock_user(user).await;
        let eligibility = self.compute_eligibility(user).await?;
        if !eligibility.can_request {
            return Err(Error::NotEligible(eligibility.message));
        }
        if requested > eligibility.available_layaway {
            return Err(Error::LimitExceeded {
                requested,
                available: eligibility.available_layaway,
            });
        }

        let mut changes = Changeset::new();
        changes.put_layaway(&mut layaway)?;
        self.commit(changes).await?;
        tracing::info!(layaway = %layaway.id, user = %user, item_value = %layaway.item_value, total = %layaway.total, "layaway requested");
        Ok(layaway)
    }

    /// Reads the layaway, locks its owner, re-reads, applies `transition`
    /// and commits. The closure sees the fresh row; a closure that leaves
    /// the status alone writes nothing.
    async fn transition_layaway<F>(&self, id: LayawayId, event: &'static str, transition: F) -> Result<Layaway>
    where
        F: FnOnce(&mut Layaway) -> Result<()>,
    {
        let owner = self.fetch_layaway(id).await?.user;
        let _guard = self.lock_user(owner).await;
        let mut layaway = self.fetch_layaway(id).await?;
        let from = layaway.status;
        transition(&mut layaway)?;
        if layaway.status == from {
            return Ok(layaway);
        }

        let mut changes = Changeset::new();
        changes.put_layaway(&mut layaway)?;
        self.commit(changes).await?;
        tracing::info!(layaway = %id, user = %owner, ?from, to = ?layaway.status, "layaway {event}");
        Ok(layaway)
    }

    /// The item is secured; the cooling-off window starts.
    pub async fn confirm_layaway(&self, actor: &Actor, id: LayawayId) -> Result<Layaway> {
        require_operator(actor)?;
        let now = self.now();
        self.transition_layaway(id, "confirmed", |l| l.confirm(self.policy(), now))
            .await
    }

    pub async fn activate_layaway(
        &self,
        actor: &Actor,
        id: LayawayId,
        duration_days: Option<u32>,
    ) -> Result<Layaway> {
        require_operator(actor)?;
        let now = self.now();
        self.transition_layaway(id, "activated", |l| {
            l.activate(duration_days, self.policy(), now)
        })
        .await
    }

    /// Cancels on behalf of the owner or an operator. Only an operator may
    /// waive the penalty outside the cooling-off window.
    pub async fn cancel_layaway(
        &self,
        actor: &Actor,
        id: LayawayId,
        apply_penalty: bool,
    ) -> Result<Layaway> {
        self.layaway(actor, id).await?;
        if !apply_penalty {
            require_operator(actor)?;
        }
        let now = self.now();
        let layaway = self
            .transition_layaway(id, "canceled", |l| {
                l.cancel(apply_penalty, self.policy(), now)
            })
            .await?;
        if !layaway.cancellation_penalty.is_zero() {
            tracing::info!(layaway = %id, penalty = %layaway.cancellation_penalty, "cancellation penalty applied");
        }
        Ok(layaway)
    }

    pub async fn complete_layaway(&self, actor: &Actor, id: LayawayId) -> Result<Layaway> {
        require_operator(actor)?;
        let now = self.now();
        self.transition_layaway(id, "completed", |l| l.mark_completed(now))
            .await
    }

    pub async fn default_layaway(&self, actor: &Actor, id: LayawayId) -> Result<Layaway> {
        require_operator(actor)?;
        let now = self.now();
        self.transition_layaway(id, "defaulted", |l| l.mark_defaulted(self.policy(), now))
            .await
    }

    /// Marks defaulted every active layaway past its end date that is not
    /// paid in full. Safe to run repeatedly.
    pub async fn default_overdue_layaways(&self) -> Result<SweepReport> {
        let now = self.now();
        let overdue: Vec<_> = self
            .store()
            .layaways_with_status(LayawayStatus::Active)
            .await?
            .into_iter()
            .filter(|l| l.is_overdue(now))
            .collect();

        let mut report = SweepReport::default();
        for layaway in overdue {
            let outcome = self.default_if_overdue(layaway.id).await;
            report.record(layaway.id, outcome);
        }
        tracing::info!(defaulted = report.transitioned, failed = report.failures.len(), "layaway sweep done");
        Ok(report)
    }

    async fn default_if_overdue(&self, id: LayawayId) -> Result<bool> {
        let now = self.now();
        let mut defaulted = false;
        self.transition_layaway(id, "defaulted", |l| {
            if l.is_overdue(now) {
                defaulted = true;
                l.mark_defaulted(self.policy(), now)
            } else {
                Ok(())
            }
        })
        .await?;
        Ok(defaulted)
    }
}
