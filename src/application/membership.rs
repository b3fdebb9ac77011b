//! Tier catalog and the subscription lifecycle.

use super::engine::{LayawayEngine, SweepReport, require_access, require_operator};
use crate::domain::ids::{Actor, SubscriptionId, TierId, UserId};
use crate::domain::membership::{MembershipStatus, MembershipSubscription, PaymentInfo};
use crate::domain::ports::{Changeset, MembershipStore, TierStore};
use crate::domain::tier::{MembershipTier, default_tiers};
use crate::error::{Error, Result};

fn newest_first(subs: &mut [MembershipSubscription]) {
    subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl LayawayEngine {
    /// Creates or edits a tier. Names are unique, case-insensitively.
    pub async fn upsert_tier(&self, actor: &Actor, mut tier: MembershipTier) -> Result<MembershipTier> {
        require_operator(actor)?;
        if tier.name.trim().is_empty() {
            return Err(Error::Validation("Tier name is required.".to_string()));
        }
        if tier.duration_days == 0 {
            return Err(Error::Validation(
                "Tier duration must be at least one day.".to_string(),
            ));
        }
        let taken = self.store().tiers().await?.into_iter().any(|t| {
            t.id != tier.id && t.name.trim().eq_ignore_ascii_case(tier.name.trim())
        });
        if taken {
            return Err(Error::Validation(format!(
                "A tier named {} already exists.",
                tier.name
            )));
        }

        let mut changes = Changeset::new();
        changes.put_tier(&mut tier);
        self.commit(changes).await?;
        tracing::info!(tier = %tier.id, name = %tier.name, price = %tier.price, "tier saved");
        Ok(tier)
    }

    /// Installs the default catalog when no tier exists yet. Returns the
    /// tiers it created, empty when the catalog was already populated.
    pub async fn seed_default_tiers(&self, actor: &Actor) -> Result<Vec<MembershipTier>> {
        require_operator(actor)?;
        if !self.store().tiers().await?.is_empty() {
            return Ok(Vec::new());
        }
        let mut tiers = default_tiers();
        let mut changes = Changeset::new();
        for tier in &mut tiers {
            changes.put_tier(tier);
        }
        self.commit(changes).await?;
        tracing::info!(count = tiers.len(), "default tiers installed");
        Ok(tiers)
    }

    /// All tiers, cheapest first.
    pub async fn tiers(&self) -> Result<Vec<MembershipTier>> {
        self.store().tiers().await
    }

    async fn fetch_subscription(&self, id: SubscriptionId) -> Result<MembershipSubscription> {
        self.store()
            .subscription(id)
            .await?
            .ok_or_else(|| Error::not_found("subscription", id))
    }

    /// Reads a subscription the caller may see. Other members' rows look
    /// missing rather than forbidden.
    pub async fn subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<MembershipSubscription> {
        let sub = self.fetch_subscription(id).await?;
        if actor.can_access(sub.user) {
            Ok(sub)
        } else {
            Err(Error::not_found("subscription", id))
        }
    }

    /// Opens a pending request. A second pending request for the same tier
    /// fails with `DuplicatePending`.
    pub async fn create_subscription(
        &self,
        actor: &Actor,
        user: UserId,
        tier: TierId,
        payment: PaymentInfo,
    ) -> Result<MembershipSubscription> {
        require_access(actor, user)?;
        let tier = self
            .store()
            .tier(tier)
            .await?
            .ok_or(Error::TierUnavailable)?;

        let _guard = self.lock_user(user).await;
        let existing = self.store().subscriptions_for_user(user).await?;
        if existing
            .iter()
            .any(|s| s.tier == tier.id && s.status == MembershipStatus::Pending)
        {
            return Err(Error::DuplicatePending);
        }

        let mut sub = MembershipSubscription::request(user, &tier, payment, self.now())?;
        let mut changes = Changeset::new();
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;
        tracing::info!(subscription = %sub.id, user = %user, tier = %tier.name, "membership requested");
        Ok(sub)
    }

    pub async fn update_payment_info(
        &self,
        actor: &Actor,
        id: SubscriptionId,
        payment: PaymentInfo,
    ) -> Result<MembershipSubscription> {
        let owner = self.subscription(actor, id).await?.user;
        let _guard = self.lock_user(owner).await;
        let mut sub = self.fetch_subscription(id).await?;
        let tier = self
            .store()
            .tier(sub.tier)
            .await?
            .ok_or_else(|| Error::not_found("tier", sub.tier))?;

        sub.update_payment(payment, tier.price, self.now())?;
        let mut changes = Changeset::new();
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;
        Ok(sub)
    }

    pub async fn mark_paid(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<MembershipSubscription> {
        require_operator(actor)?;
        let owner = self.fetch_subscription(id).await?.user;
        let _guard = self.lock_user(owner).await;
        let mut sub = self.fetch_subscription(id).await?;

        sub.mark_paid(actor.user, self.now())?;
        sub.validate()?;
        let mut changes = Changeset::new();
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;
        tracing::info!(subscription = %id, operator = %actor.user, "membership marked paid");
        Ok(sub)
    }

    /// Activates a subscription and expires every other active one of the
    /// same user, all in one commit.
    pub async fn activate_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<MembershipSubscription> {
        require_operator(actor)?;
        let owner = self.fetch_subscription(id).await?.user;
        let _guard = self.lock_user(owner).await;
        let mut sub = self.fetch_subscription(id).await?;
        let tier = self
            .store()
            .tier(sub.tier)
            .await?
            .ok_or_else(|| Error::not_found("tier", sub.tier))?;
        let now = self.now();

        let mut superseded: Vec<_> = self
            .store()
            .subscriptions_for_user(owner)
            .await?
            .into_iter()
            .filter(|s| s.id != id && s.status == MembershipStatus::Active)
            .collect();

        sub.activate(actor.user, tier.duration_days, now)?;
        sub.validate()?;

        let mut changes = Changeset::new();
        for prior in &mut superseded {
            prior.supersede(now);
            changes.put_subscription(prior);
        }
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;

        for prior in &superseded {
            tracing::info!(subscription = %prior.id, user = %owner, "membership superseded");
        }
        tracing::info!(subscription = %id, user = %owner, end = ?sub.end_date, "membership activated");
        Ok(sub)
    }

    pub async fn cancel_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<MembershipSubscription> {
        let owner = self.subscription(actor, id).await?.user;
        let _guard = self.lock_user(owner).await;
        let mut sub = self.fetch_subscription(id).await?;

        sub.cancel(self.now())?;
        let mut changes = Changeset::new();
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;
        tracing::info!(subscription = %id, user = %owner, "membership canceled");
        Ok(sub)
    }

    /// The user's active subscription whose end date is still ahead.
    pub async fn active_for_user(
        &self,
        actor: &Actor,
        user: UserId,
    ) -> Result<Option<MembershipSubscription>> {
        require_access(actor, user)?;
        self.current_membership(user).await
    }

    pub(crate) async fn current_membership(
        &self,
        user: UserId,
    ) -> Result<Option<MembershipSubscription>> {
        let now = self.now();
        Ok(self
            .store()
            .subscriptions_for_user(user)
            .await?
            .into_iter()
            .find(|s| s.is_currently_active(now)))
    }

    /// Every subscription of `user`, newest first.
    pub async fn list_subscriptions(
        &self,
        actor: &Actor,
        user: UserId,
    ) -> Result<Vec<MembershipSubscription>> {
        require_access(actor, user)?;
        let mut subs = self.store().subscriptions_for_user(user).await?;
        newest_first(&mut subs);
        Ok(subs)
    }

    /// Pending requests of one user, or of everyone for an operator.
    pub async fn list_pending(
        &self,
        actor: &Actor,
        user: Option<UserId>,
    ) -> Result<Vec<MembershipSubscription>> {
        let mut subs = match user {
            Some(user) => {
                require_access(actor, user)?;
                self.store()
                    .subscriptions_for_user(user)
                    .await?
                    .into_iter()
                    .filter(|s| s.status == MembershipStatus::Pending)
                    .collect()
            }
            None => {
                require_operator(actor)?;
                self.store()
                    .subscriptions_with_status(MembershipStatus::Pending)
                    .await?
            }
        };
        newest_first(&mut subs);
        Ok(subs)
    }

    /// Expired and canceled subscriptions, newest first.
    pub async fn list_history(
        &self,
        actor: &Actor,
        user: UserId,
    ) -> Result<Vec<MembershipSubscription>> {
        require_access(actor, user)?;
        let mut subs: Vec<_> = self
            .store()
            .subscriptions_for_user(user)
            .await?
            .into_iter()
            .filter(MembershipSubscription::is_history)
            .collect();
        newest_first(&mut subs);
        Ok(subs)
    }

    /// Expires every active subscription whose end date has passed.
    /// Safe to run repeatedly and alongside member flows.
    pub async fn expire_due_memberships(&self) -> Result<SweepReport> {
        let now = self.now();
        let due: Vec<_> = self
            .store()
            .subscriptions_with_status(MembershipStatus::Active)
            .await?
            .into_iter()
            .filter(|s| s.end_date.is_some_and(|end| end <= now))
            .collect();

        let mut report = SweepReport::default();
        for sub in due {
            let outcome = self.expire_one(sub.id, sub.user).await;
            report.record(sub.id, outcome);
        }
        tracing::info!(expired = report.transitioned, failed = report.failures.len(), "membership sweep done");
        Ok(report)
    }

    async fn expire_one(&self, id: SubscriptionId, owner: UserId) -> Result<bool> {
        let _guard = self.lock_user(owner).await;
        let mut sub = self.fetch_subscription(id).await?;
        if !sub.expire_if_due(self.now()) {
            return Ok(false);
        }
        let mut changes = Changeset::new();
        changes.put_subscription(&mut sub);
        self.commit(changes).await?;
        tracing::info!(subscription = %id, user = %owner, "membership expired");
        Ok(true)
    }
}
