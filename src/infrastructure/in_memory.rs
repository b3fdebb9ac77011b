use crate::domain::ids::{LayawayId, PaymentId, RefundId, SubscriptionId, TierId, UserId};
use crate::domain::layaway::{Layaway, LayawayStatus};
use crate::domain::membership::{MembershipStatus, MembershipSubscription};
use crate::domain::payment::LayawayPayment;
use crate::domain::ports::{
    Changeset, LayawayStore, MembershipStore, SavingsStore, TierStore, UnitOfWork,
    check_membership_constraints, check_tier_constraints,
};
use crate::domain::savings::{RefundRequest, SavingsAccount, SavingsTransaction};
use crate::domain::tier::MembershipTier;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    tiers: HashMap<TierId, MembershipTier>,
    subscriptions: HashMap<SubscriptionId, MembershipSubscription>,
    layaways: HashMap<LayawayId, Layaway>,
    payments: HashMap<PaymentId, LayawayPayment>,
    accounts: HashMap<UserId, SavingsAccount>,
    entries: HashMap<UserId, Vec<SavingsTransaction>>,
    refunds: HashMap<RefundId, RefundRequest>,
}

impl Tables {
    fn validate(&self, changes: &Changeset) -> Result<()> {
        for s in &changes.tiers {
            s.check(self.tiers.get(&s.record.id))?;
        }
        for s in &changes.subscriptions {
            s.check(self.subscriptions.get(&s.record.id))?;
        }
        for s in &changes.layaways {
            s.check(self.layaways.get(&s.record.id))?;
        }
        for s in &changes.payments {
            s.check(self.payments.get(&s.record.id))?;
        }
        for s in &changes.accounts {
            s.check(self.accounts.get(&s.record.user))?;
        }
        for s in &changes.refunds {
            s.check(self.refunds.get(&s.record.id))?;
        }
        for entry in &changes.entries {
            let log = self.entries.get(&entry.user);
            if log.is_some_and(|log| log.iter().any(|e| e.id == entry.id || e.seq == entry.seq)) {
                return Err(Error::Conflict {
                    entity: "savings transaction",
                    id: entry.id.to_string(),
                });
            }
        }

        check_tier_constraints(self.tiers.values(), &changes.tiers)?;
        let owners = changes.subscription_owners();
        let existing = self
            .subscriptions
            .values()
            .filter(|s| owners.contains(&s.user));
        check_membership_constraints(existing, &changes.subscriptions)
    }

    fn apply(&mut self, changes: Changeset) {
        for s in changes.tiers {
            self.tiers.insert(s.record.id, s.record);
        }
        for s in changes.subscriptions {
            self.subscriptions.insert(s.record.id, s.record);
        }
        for s in changes.layaways {
            self.layaways.insert(s.record.id, s.record);
        }
        for s in changes.payments {
            self.payments.insert(s.record.id, s.record);
        }
        for s in changes.accounts {
            self.accounts.insert(s.record.user, s.record);
        }
        for entry in changes.entries {
            self.entries.entry(entry.user).or_default().push(entry);
        }
        for s in changes.refunds {
            self.refunds.insert(s.record.id, s.record);
        }
    }
}

/// A thread-safe in-memory store for every entity.
///
/// All tables sit behind one `RwLock`, so a commit validates and applies
/// under a single write guard. Ideal for testing or for a process that does
/// not need persistence.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TierStore for InMemoryStore {
    async fn tier(&self, id: TierId) -> Result<Option<MembershipTier>> {
        let tables = self.tables.read().await;
        Ok(tables.tiers.get(&id).cloned())
    }

    async fn tiers(&self) -> Result<Vec<MembershipTier>> {
        let tables = self.tables.read().await;
        let mut tiers: Vec<_> = tables.tiers.values().cloned().collect();
        tiers.sort_by_key(|t| t.price);
        Ok(tiers)
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn subscription(&self, id: SubscriptionId) -> Result<Option<MembershipSubscription>> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.get(&id).cloned())
    }

    async fn subscriptions_for_user(&self, user: UserId) -> Result<Vec<MembershipSubscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.user == user)
            .cloned()
            .collect())
    }

    async fn subscriptions_with_status(
        &self,
        status: MembershipStatus,
    ) -> Result<Vec<MembershipSubscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LayawayStore for InMemoryStore {
    async fn layaway(&self, id: LayawayId) -> Result<Option<Layaway>> {
        let tables = self.tables.read().await;
        Ok(tables.layaways.get(&id).cloned())
    }

    async fn layaways_for_user(&self, user: UserId) -> Result<Vec<Layaway>> {
        let tables = self.tables.read().await;
        Ok(tables
            .layaways
            .values()
            .filter(|l| l.user == user)
            .cloned()
            .collect())
    }

    async fn layaways_with_status(&self, status: LayawayStatus) -> Result<Vec<Layaway>> {
        let tables = self.tables.read().await;
        Ok(tables
            .layaways
            .values()
            .filter(|l| l.status == status)
            .cloned()
            .collect())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<LayawayPayment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payments_for_layaway(&self, layaway: LayawayId) -> Result<Vec<LayawayPayment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.layaway == layaway)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SavingsStore for InMemoryStore {
    async fn account(&self, user: UserId) -> Result<Option<SavingsAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&user).cloned())
    }

    async fn entries(&self, user: UserId) -> Result<Vec<SavingsTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.get(&user).cloned().unwrap_or_default())
    }

    async fn refunds(&self, user: UserId) -> Result<Vec<RefundRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refunds
            .values()
            .filter(|r| r.user == user)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit(&self, changes: Changeset) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.validate(&changes)?;
        tables.apply(changes);
        Ok(())
    }
}
