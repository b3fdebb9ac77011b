use crate::domain::ids::{LayawayId, PaymentId, SubscriptionId, TierId, UserId};
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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_TIERS: &str = "tiers";
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
pub const CF_LAYAWAYS: &str = "layaways";
pub const CF_PAYMENTS: &str = "payments";
pub const CF_ACCOUNTS: &str = "accounts";
/// Ledger entries keyed by `user ++ seq` (big-endian) so a prefix scan
/// yields one account's log in order.
pub const CF_ENTRIES: &str = "entries";
pub const CF_REFUNDS: &str = "refunds";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_TIERS,
    CF_SUBSCRIPTIONS,
    CF_LAYAWAYS,
    CF_PAYMENTS,
    CF_ACCOUNTS,
    CF_ENTRIES,
    CF_REFUNDS,
];

fn entry_key(user: UserId, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user.as_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family as JSON. Commits are
/// serialized through an async mutex, validated against the stored
/// versions and constraints, then written as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            Error::Storage(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        self.scan_from(cf, &[])
    }

    /// Reads every value whose key starts with `prefix`, in key order.
    fn scan_from<T: DeserializeOwned>(&self, cf: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };
        let mut values = Vec::new();
        for item in self.db.iterator_cf(handle, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        batch.put_cf(self.cf(cf)?, key, bytes);
        Ok(())
    }

    fn validate(&self, changes: &Changeset) -> Result<()> {
        for s in &changes.tiers {
            s.check(self.get::<MembershipTier>(CF_TIERS, s.record.id.as_bytes())?.as_ref())?;
        }
        for s in &changes.subscriptions {
            let current: Option<MembershipSubscription> =
                self.get(CF_SUBSCRIPTIONS, s.record.id.as_bytes())?;
            s.check(current.as_ref())?;
        }
        for s in &changes.layaways {
            s.check(self.get::<Layaway>(CF_LAYAWAYS, s.record.id.as_bytes())?.as_ref())?;
        }
        for s in &changes.payments {
            s.check(self.get::<LayawayPayment>(CF_PAYMENTS, s.record.id.as_bytes())?.as_ref())?;
        }
        for s in &changes.accounts {
            s.check(self.get::<SavingsAccount>(CF_ACCOUNTS, s.record.user.as_bytes())?.as_ref())?;
        }
        for s in &changes.refunds {
            s.check(self.get::<RefundRequest>(CF_REFUNDS, s.record.id.as_bytes())?.as_ref())?;
        }
        for entry in &changes.entries {
            let key = entry_key(entry.user, entry.seq);
            if self.db.get_pinned_cf(self.cf(CF_ENTRIES)?, key)?.is_some() {
                return Err(Error::Conflict {
                    entity: "savings transaction",
                    id: entry.id.to_string(),
                });
            }
        }

        if !changes.tiers.is_empty() {
            let stored = self.scan::<MembershipTier>(CF_TIERS)?;
            check_tier_constraints(&stored, &changes.tiers)?;
        }

        let owners = changes.subscription_owners();
        if owners.is_empty() {
            return Ok(());
        }
        let existing: Vec<MembershipSubscription> = self
            .scan::<MembershipSubscription>(CF_SUBSCRIPTIONS)?
            .into_iter()
            .filter(|s| owners.contains(&s.user))
            .collect();
        check_membership_constraints(&existing, &changes.subscriptions)
    }

    fn write(&self, changes: Changeset) -> Result<()> {
        let mut batch = WriteBatch::default();
        for s in &changes.tiers {
            self.put(&mut batch, CF_TIERS, s.record.id.as_bytes(), &s.record)?;
        }
        for s in &changes.subscriptions {
            self.put(&mut batch, CF_SUBSCRIPTIONS, s.record.id.as_bytes(), &s.record)?;
        }
        for s in &changes.layaways {
            self.put(&mut batch, CF_LAYAWAYS, s.record.id.as_bytes(), &s.record)?;
        }
        for s in &changes.payments {
            self.put(&mut batch, CF_PAYMENTS, s.record.id.as_bytes(), &s.record)?;
        }
        for s in &changes.accounts {
            self.put(&mut batch, CF_ACCOUNTS, s.record.user.as_bytes(), &s.record)?;
        }
        for entry in &changes.entries {
            self.put(&mut batch, CF_ENTRIES, &entry_key(entry.user, entry.seq), entry)?;
        }
        for s in &changes.refunds {
            self.put(&mut batch, CF_REFUNDS, s.record.id.as_bytes(), &s.record)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl TierStore for RocksDBStore {
    async fn tier(&self, id: TierId) -> Result<Option<MembershipTier>> {
        self.get(CF_TIERS, id.as_bytes())
    }

    async fn tiers(&self) -> Result<Vec<MembershipTier>> {
        let mut tiers: Vec<MembershipTier> = self.scan(CF_TIERS)?;
        tiers.sort_by_key(|t| t.price);
        Ok(tiers)
    }
}

#[async_trait]
impl MembershipStore for RocksDBStore {
    async fn subscription(&self, id: SubscriptionId) -> Result<Option<MembershipSubscription>> {
        self.get(CF_SUBSCRIPTIONS, id.as_bytes())
    }

    async fn subscriptions_for_user(&self, user: UserId) -> Result<Vec<MembershipSubscription>> {
        let all: Vec<MembershipSubscription> = self.scan(CF_SUBSCRIPTIONS)?;
        Ok(all.into_iter().filter(|s| s.user == user).collect())
    }

    async fn subscriptions_with_status(
        &self,
        status: MembershipStatus,
    ) -> Result<Vec<MembershipSubscription>> {
        let all: Vec<MembershipSubscription> = self.scan(CF_SUBSCRIPTIONS)?;
        Ok(all.into_iter().filter(|s| s.status == status).collect())
    }
}

#[async_trait]
impl LayawayStore for RocksDBStore {
    async fn layaway(&self, id: LayawayId) -> Result<Option<Layaway>> {
        self.get(CF_LAYAWAYS, id.as_bytes())
    }

    async fn layaways_for_user(&self, user: UserId) -> Result<Vec<Layaway>> {
        let all: Vec<Layaway> = self.scan(CF_LAYAWAYS)?;
        Ok(all.into_iter().filter(|l| l.user == user).collect())
    }

    async fn layaways_with_status(&self, status: LayawayStatus) -> Result<Vec<Layaway>> {
        let all: Vec<Layaway> = self.scan(CF_LAYAWAYS)?;
        Ok(all.into_iter().filter(|l| l.status == status).collect())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<LayawayPayment>> {
        self.get(CF_PAYMENTS, id.as_bytes())
    }

    async fn payments_for_layaway(&self, layaway: LayawayId) -> Result<Vec<LayawayPayment>> {
        let all: Vec<LayawayPayment> = self.scan(CF_PAYMENTS)?;
        Ok(all.into_iter().filter(|p| p.layaway == layaway).collect())
    }
}

#[async_trait]
impl SavingsStore for RocksDBStore {
    async fn account(&self, user: UserId) -> Result<Option<SavingsAccount>> {
        self.get(CF_ACCOUNTS, user.as_bytes())
    }

    async fn entries(&self, user: UserId) -> Result<Vec<SavingsTransaction>> {
        self.scan_from(CF_ENTRIES, user.as_bytes())
    }

    async fn refunds(&self, user: UserId) -> Result<Vec<RefundRequest>> {
        let all: Vec<RefundRequest> = self.scan(CF_REFUNDS)?;
        Ok(all.into_iter().filter(|r| r.user == user).collect())
    }
}

#[async_trait]
impl UnitOfWork for RocksDBStore {
    async fn commit(&self, changes: Changeset) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        self.validate(&changes)?;
        self.write(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::savings::TransactionKind;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_round_trip() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let user = UserId::new();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let mut account = SavingsAccount::new(user, now);
            let mut changes = Changeset::new();
            for amount in [1_000, 2_000, 3_000] {
                let entry = account
                    .credit(Money::new(amount), TransactionKind::Deposit, None, None, now)
                    .unwrap();
                changes.append_entry(entry);
            }
            changes.put_account(&mut account);
            store.commit(changes).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let account = store.account(user).await.unwrap().unwrap();
        assert_eq!(account.balance, Money::new(6_000));
        let entries = store.entries(user).await.unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(store.entries(UserId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_stale_version() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let mut tier = MembershipTier::new("Basic", Money::new(10_000), Money::new(30_000));
        let mut stale = tier.clone();

        let mut changes = Changeset::new();
        changes.put_tier(&mut tier);
        store.commit(changes).await.unwrap();

        let mut changes = Changeset::new();
        changes.put_tier(&mut stale);
        assert!(matches!(
            store.commit(changes).await,
            Err(Error::Conflict { entity: "tier", .. })
        ));
        assert_eq!(store.tiers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_duplicate_tier_name() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let mut basic = MembershipTier::new("Basic", Money::new(10_000), Money::new(30_000));
        let mut changes = Changeset::new();
        changes.put_tier(&mut basic);
        store.commit(changes).await.unwrap();

        let mut clash = MembershipTier::new("basic", Money::new(1), Money::new(2));
        let mut changes = Changeset::new();
        changes.put_tier(&mut clash);
        assert!(matches!(
            store.commit(changes).await,
            Err(Error::Constraint(crate::domain::ports::Constraint::TierName))
        ));
        assert_eq!(store.tiers().await.unwrap().len(), 1);
    }
}
