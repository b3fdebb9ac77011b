//! Savings ledger: balance, deposits, debits, transaction log, refunds.

use super::engine::{LayawayEngine, require_access, require_operator};
use crate::domain::ids::{Actor, LayawayId, UserId};
use crate::domain::money::Money;
use crate::domain::ports::{Changeset, SavingsStore};
use crate::domain::savings::{
    RefundRequest, SavingsAccount, SavingsTransaction, TransactionKind, replay_balance,
};
use crate::error::Result;

impl LayawayEngine {
    /// Loads the user's account, or a fresh unsaved one on first access.
    async fn account_or_new(&self, user: UserId) -> Result<SavingsAccount> {
        Ok(self
            .store()
            .account(user)
            .await?
            .unwrap_or_else(|| SavingsAccount::new(user, self.now())))
    }

    pub async fn balance(&self, actor: &Actor, user: UserId) -> Result<Money> {
        require_access(actor, user)?;
        Ok(self.account_or_new(user).await?.balance)
    }

    /// Member deposit into their own savings.
    pub async fn deposit(
        &self,
        actor: &Actor,
        user: UserId,
        amount: Money,
        reference: Option<String>,
    ) -> Result<Money> {
        require_access(actor, user)?;
        self.credit(user, amount, TransactionKind::Deposit, reference, None)
            .await
    }

    /// Increments the balance and appends a `+amount` entry, atomically.
    /// Returns the new balance.
    pub async fn credit(
        &self,
        user: UserId,
        amount: Money,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
    ) -> Result<Money> {
        let _guard = self.lock_user(user).await;
        let mut account = self.account_or_new(user).await?;
        let entry = account.credit(amount, kind, reference, layaway, self.now())?;
        self.commit_entry(account, entry).await
    }

    /// Decrements the balance and appends a `-amount` entry, atomically.
    /// Fails with `InsufficientBalance` and leaves the account untouched when
    /// the balance does not cover `amount`.
    pub async fn debit(
        &self,
        user: UserId,
        amount: Money,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
    ) -> Result<Money> {
        let _guard = self.lock_user(user).await;
        let mut account = self.account_or_new(user).await?;
        let entry = account.debit(amount, kind, reference, layaway, self.now())?;
        self.commit_entry(account, entry).await
    }

    /// Operator-initiated ledger movement (refund payout, penalty collection).
    pub async fn post_entry(
        &self,
        actor: &Actor,
        user: UserId,
        amount: Money,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
    ) -> Result<Money> {
        require_operator(actor)?;
        if kind.is_credit() {
            self.credit(user, amount, kind, reference, layaway).await
        } else {
            self.debit(user, amount, kind, reference, layaway).await
        }
    }

    async fn commit_entry(
        &self,
        mut account: SavingsAccount,
        entry: SavingsTransaction,
    ) -> Result<Money> {
        let (kind, amount, seq) = (entry.kind, entry.amount, entry.seq);
        let mut changes = Changeset::new();
        changes.put_account(&mut account).append_entry(entry);
        self.commit(changes).await?;
        tracing::info!(user = %account.user, ?kind, amount, seq, balance = %account.balance, "ledger entry posted");
        Ok(account.balance)
    }

    /// The account's entries, newest first, capped at the policy page size.
    pub async fn list_transactions(
        &self,
        actor: &Actor,
        user: UserId,
    ) -> Result<Vec<SavingsTransaction>> {
        require_access(actor, user)?;
        let mut entries = self.store().entries(user).await?;
        entries.reverse();
        entries.truncate(self.policy().transaction_page_size);
        Ok(entries)
    }

    /// Balance recomputed from the full log, for auditing the cached value.
    pub async fn ledger_balance(&self, actor: &Actor, user: UserId) -> Result<i64> {
        require_access(actor, user)?;
        let entries = self.store().entries(user).await?;
        Ok(replay_balance(&entries))
    }

    /// Opens a pending refund request bounded by the current balance.
    pub async fn request_refund(
        &self,
        actor: &Actor,
        user: UserId,
        amount: Money,
        reason: impl Into<String>,
    ) -> Result<RefundRequest> {
        require_access(actor, user)?;
        let _guard = self.lock_user(user).await;
        let mut account = self.account_or_new(user).await?;
        let mut refund = RefundRequest::open(&account, amount, reason, self.now())?;

        let mut changes = Changeset::new();
        if account.version == 0 {
            changes.put_account(&mut account);
        }
        changes.put_refund(&mut refund);
        self.commit(changes).await?;
        tracing::info!(user = %user, refund = %refund.id, amount = %refund.amount, "refund requested");
        Ok(refund)
    }

    pub async fn list_refunds(&self, actor: &Actor, user: UserId) -> Result<Vec<RefundRequest>> {
        require_access(actor, user)?;
        let mut refunds = self.store().refunds(user).await?;
        refunds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(refunds)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::engine::LayawayEngine;
    use crate::config::Policy;
    use crate::domain::ids::{Actor, UserId};
    use crate::domain::money::Money;
    use crate::domain::ports::SavingsStore;
    use crate::domain::savings::TransactionKind;
    use crate::error::Error;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;

    fn engine() -> LayawayEngine {
        LayawayEngine::new(Arc::new(InMemoryStore::new()), Policy::default())
    }

    #[tokio::test]
    async fn test_balance_of_new_member_is_zero() {
        let engine = engine();
        let user = UserId::new();
        let balance = engine.balance(&Actor::member(user), user).await.unwrap();
        assert_eq!(balance, Money::ZERO);
        // Reading does not create the account.
        assert!(engine.store().account(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deposit_then_debit() {
        let engine = engine();
        let user = UserId::new();
        let member = Actor::member(user);

        engine
            .deposit(&member, user, Money::new(15_000), Some("MM-1".into()))
            .await
            .unwrap();
        let balance = engine
            .debit(user, Money::new(10_000), TransactionKind::CancelPenalty, None, None)
            .await
            .unwrap();
        assert_eq!(balance, Money::new(5_000));

        let entries = engine.list_transactions(&member, user).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, -10_000);
        assert_eq!(entries[1].amount, 15_000);
        assert_eq!(engine.ledger_balance(&member, user).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_rejected() {
        let engine = engine();
        let user = UserId::new();
        engine
            .credit(user, Money::new(1_000), TransactionKind::Deposit, None, None)
            .await
            .unwrap();

        let result = engine
            .debit(user, Money::new(1_001), TransactionKind::Withdrawal, None, None)
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert_eq!(
            engine.balance(&Actor::member(user), user).await.unwrap(),
            Money::new(1_000)
        );
        assert_eq!(engine.store().entries(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_member_cannot_touch_other_accounts() {
        let engine = engine();
        let owner = UserId::new();
        let stranger = Actor::member(UserId::new());
        assert!(matches!(
            engine.deposit(&stranger, owner, Money::new(1), None).await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            engine
                .post_entry(&stranger, owner, Money::new(1), TransactionKind::Refund, None, None)
                .await,
            Err(Error::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_post_entry_direction_follows_kind() {
        let engine = engine();
        let user = UserId::new();
        let operator = Actor::operator(UserId::new());
        engine
            .post_entry(&operator, user, Money::new(8_000), TransactionKind::LayawayRefund, None, None)
            .await
            .unwrap();
        let balance = engine
            .post_entry(&operator, user, Money::new(3_000), TransactionKind::Penalty, None, None)
            .await
            .unwrap();
        assert_eq!(balance, Money::new(5_000));
    }

    #[tokio::test]
    async fn test_refund_request_checks_balance() {
        let engine = engine();
        let user = UserId::new();
        let member = Actor::member(user);

        assert!(matches!(
            engine.request_refund(&member, user, Money::new(1), "").await,
            Err(Error::InsufficientBalance { .. })
        ));

        engine.deposit(&member, user, Money::new(4_000), None).await.unwrap();
        let refund = engine
            .request_refund(&member, user, Money::new(4_000), "rent")
            .await
            .unwrap();
        assert_eq!(refund.amount, Money::new(4_000));

        let refunds = engine.list_refunds(&member, user).await.unwrap();
        assert_eq!(refunds.len(), 1);
        // Requesting does not move money.
        assert_eq!(engine.balance(&member, user).await.unwrap(), Money::new(4_000));
    }

    #[tokio::test]
    async fn test_transaction_listing_is_paged() {
        let mut policy = Policy::default();
        policy.transaction_page_size = 3;
        let engine = LayawayEngine::new(Arc::new(InMemoryStore::new()), policy);
        let user = UserId::new();
        for i in 1..=5 {
            engine
                .credit(user, Money::new(i), TransactionKind::Deposit, None, None)
                .await
                .unwrap();
        }
        let entries = engine
            .list_transactions(&Actor::member(user), user)
            .await
            .unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![5, 4, 3]);
    }
}
