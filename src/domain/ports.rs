use super::ids::{LayawayId, PaymentId, RefundId, SubscriptionId, TierId, UserId};
use super::layaway::{Layaway, LayawayStatus};
use super::membership::{MembershipStatus, MembershipSubscription};
use super::payment::LayawayPayment;
use super::savings::{RefundRequest, SavingsAccount, SavingsTransaction};
use super::tier::MembershipTier;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

/// Uniqueness rules every store enforces at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// At most one pending subscription per (user, tier).
    PendingPerTier,
    /// At most one active subscription per user.
    ActivePerUser,
    /// Tier names are unique, ignoring case and surrounding whitespace.
    TierName,
}

/// A persisted row with an optimistic-concurrency version.
pub trait Record: Clone + Send + Sync {
    const ENTITY: &'static str;
    type Key: Copy + Eq + Hash + Display + Send + Sync;

    fn key(&self) -> Self::Key;
    fn version(&self) -> u64;
    fn version_mut(&mut self) -> &mut u64;
}

macro_rules! record {
    ($ty:ty, $entity:literal, $key:ty, $field:ident) => {
        impl Record for $ty {
            const ENTITY: &'static str = $entity;
            type Key = $key;

            fn key(&self) -> Self::Key {
                self.$field
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn version_mut(&mut self) -> &mut u64 {
                &mut self.version
            }
        }
    };
}

record!(MembershipTier, "tier", TierId, id);
record!(MembershipSubscription, "subscription", SubscriptionId, id);
record!(Layaway, "layaway", LayawayId, id);
record!(LayawayPayment, "payment", PaymentId, id);
record!(SavingsAccount, "savings account", UserId, user);
record!(RefundRequest, "refund request", RefundId, id);

/// A row written by a [`Changeset`], with the version it was read at.
#[derive(Debug, Clone)]
pub struct Staged<R> {
    pub expected: u64,
    pub record: R,
}

impl<R: Record> Staged<R> {
    /// Fails with `Conflict` unless the stored row is still at `expected`.
    pub fn check(&self, current: Option<&R>) -> Result<()> {
        let stored = current.map_or(0, Record::version);
        if stored == self.expected {
            Ok(())
        } else {
            Err(Error::Conflict {
                entity: R::ENTITY,
                id: self.record.key().to_string(),
            })
        }
    }
}

/// Everything one operation writes. Stores apply a changeset atomically.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub tiers: Vec<Staged<MembershipTier>>,
    pub subscriptions: Vec<Staged<MembershipSubscription>>,
    pub layaways: Vec<Staged<Layaway>>,
    pub payments: Vec<Staged<LayawayPayment>>,
    pub accounts: Vec<Staged<SavingsAccount>>,
    pub entries: Vec<SavingsTransaction>,
    pub refunds: Vec<Staged<RefundRequest>>,
}

fn stage<R: Record>(list: &mut Vec<Staged<R>>, record: &mut R) {
    let expected = record.version();
    *record.version_mut() = expected + 1;
    list.push(Staged {
        expected,
        record: record.clone(),
    });
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tier(&mut self, tier: &mut MembershipTier) -> &mut Self {
        stage(&mut self.tiers, tier);
        self
    }

    pub fn put_subscription(&mut self, sub: &mut MembershipSubscription) -> &mut Self {
        stage(&mut self.subscriptions, sub);
        self
    }

    /// Recomputes the total before staging; an out-of-range total stages nothing.
    pub fn put_layaway(&mut self, layaway: &mut Layaway) -> Result<&mut Self> {
        layaway.recompute_total()?;
        stage(&mut self.layaways, layaway);
        Ok(self)
    }

    pub fn put_payment(&mut self, payment: &mut LayawayPayment) -> &mut Self {
        stage(&mut self.payments, payment);
        self
    }

    pub fn put_account(&mut self, account: &mut SavingsAccount) -> &mut Self {
        stage(&mut self.accounts, account);
        self
    }

    pub fn append_entry(&mut self, entry: SavingsTransaction) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn put_refund(&mut self, refund: &mut RefundRequest) -> &mut Self {
        stage(&mut self.refunds, refund);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
            && self.subscriptions.is_empty()
            && self.layaways.is_empty()
            && self.payments.is_empty()
            && self.accounts.is_empty()
            && self.entries.is_empty()
            && self.refunds.is_empty()
    }

    /// Users whose subscriptions this changeset writes.
    pub fn subscription_owners(&self) -> HashSet<UserId> {
        self.subscriptions.iter().map(|s| s.record.user).collect()
    }
}

/// Checks the membership uniqueness rules against the state a commit would
/// leave behind. `existing` must hold every stored subscription of the users
/// touched by `staged`.
pub fn check_membership_constraints<'a>(
    existing: impl IntoIterator<Item = &'a MembershipSubscription>,
    staged: &[Staged<MembershipSubscription>],
) -> Result<()> {
    let mut after: HashMap<SubscriptionId, &MembershipSubscription> =
        existing.into_iter().map(|s| (s.id, s)).collect();
    for s in staged {
        after.insert(s.record.id, &s.record);
    }

    let mut active = HashSet::new();
    let mut pending = HashSet::new();
    for sub in after.values() {
        match sub.status {
            MembershipStatus::Active if !active.insert(sub.user) => {
                return Err(Error::Constraint(Constraint::ActivePerUser));
            }
            MembershipStatus::Pending if !pending.insert((sub.user, sub.tier)) => {
                return Err(Error::Constraint(Constraint::PendingPerTier));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Checks tier-name uniqueness against the catalog a commit would leave
/// behind. `existing` must hold every stored tier.
pub fn check_tier_constraints<'a>(
    existing: impl IntoIterator<Item = &'a MembershipTier>,
    staged: &[Staged<MembershipTier>],
) -> Result<()> {
    if staged.is_empty() {
        return Ok(());
    }
    let mut after: HashMap<TierId, &MembershipTier> =
        existing.into_iter().map(|t| (t.id, t)).collect();
    for s in staged {
        after.insert(s.record.id, &s.record);
    }

    let mut names = HashSet::new();
    for tier in after.values() {
        if !names.insert(tier.name.trim().to_ascii_lowercase()) {
            return Err(Error::Constraint(Constraint::TierName));
        }
    }
    Ok(())
}

#[async_trait]
pub trait TierStore: Send + Sync {
    async fn tier(&self, id: TierId) -> Result<Option<MembershipTier>>;
    async fn tiers(&self) -> Result<Vec<MembershipTier>>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn subscription(&self, id: SubscriptionId) -> Result<Option<MembershipSubscription>>;
    async fn subscriptions_for_user(&self, user: UserId) -> Result<Vec<MembershipSubscription>>;
    async fn subscriptions_with_status(
        &self,
        status: MembershipStatus,
    ) -> Result<Vec<MembershipSubscription>>;
}

#[async_trait]
pub trait LayawayStore: Send + Sync {
    async fn layaway(&self, id: LayawayId) -> Result<Option<Layaway>>;
    async fn layaways_for_user(&self, user: UserId) -> Result<Vec<Layaway>>;
    async fn layaways_with_status(&self, status: LayawayStatus) -> Result<Vec<Layaway>>;
    async fn payment(&self, id: PaymentId) -> Result<Option<LayawayPayment>>;
    async fn payments_for_layaway(&self, layaway: LayawayId) -> Result<Vec<LayawayPayment>>;
}

#[async_trait]
pub trait SavingsStore: Send + Sync {
    async fn account(&self, user: UserId) -> Result<Option<SavingsAccount>>;
    /// The account's ledger in log order (ascending `seq`).
    async fn entries(&self, user: UserId) -> Result<Vec<SavingsTransaction>>;
    async fn refunds(&self, user: UserId) -> Result<Vec<RefundRequest>>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Applies every write in `changes` or none of them.
    async fn commit(&self, changes: Changeset) -> Result<()>;
}

/// A complete storage backend.
pub trait Store: TierStore + MembershipStore + LayawayStore + SavingsStore + UnitOfWork {}

impl<T> Store for T where T: TierStore + MembershipStore + LayawayStore + SavingsStore + UnitOfWork {}

pub type StoreRef = Arc<dyn Store>;
