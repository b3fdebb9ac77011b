use super::ids::{EntryId, LayawayId, RefundId, UserId};
use super::money::Money;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Refund,
    LayawayPayment,
    LayawayRefund,
    /// Payment-failure penalty.
    Penalty,
    CancelPenalty,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Refund => "refund",
            TransactionKind::LayawayPayment => "layaway_payment",
            TransactionKind::LayawayRefund => "layaway_refund",
            TransactionKind::Penalty => "penalty",
            TransactionKind::CancelPenalty => "cancel_penalty",
        }
    }

    /// Kinds that add to the balance.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Deposit | TransactionKind::Refund | TransactionKind::LayawayRefund
        )
    }
}

/// Immutable ledger entry. Positive amounts are credits, negative debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsTransaction {
    pub id: EntryId,
    pub user: UserId,
    /// Position in the account's log, starting at 1.
    pub seq: u64,
    pub kind: TransactionKind,
    pub amount: i64,
    pub reference: Option<String>,
    pub layaway: Option<LayawayId>,
    pub created_at: DateTime<Utc>,
}

/// One per member, created lazily. The balance caches the sum of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsAccount {
    pub user: UserId,
    pub balance: Money,
    pub entry_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl SavingsAccount {
    pub fn new(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user,
            balance: Money::ZERO,
            entry_count: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Adds funds and returns the entry that must be appended with this change.
    pub fn credit(
        &mut self,
        amount: Money,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
        now: DateTime<Utc>,
    ) -> Result<SavingsTransaction> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "Credit amount must be positive.".to_string(),
            ));
        }
        let signed = amount.as_credit()?;
        let balance = self.balance.try_add(amount)?;
        // The cached balance must stay equal to the signed sum of the log.
        balance.as_credit()?;
        self.balance = balance;
        Ok(self.entry(signed, kind, reference, layaway, now))
    }

    /// Removes funds if sufficient; the balance never goes negative.
    pub fn debit(
        &mut self,
        amount: Money,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
        now: DateTime<Utc>,
    ) -> Result<SavingsTransaction> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "Debit amount must be positive.".to_string(),
            ));
        }
        let signed = amount.as_credit()?;
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                requested: amount,
                available: self.balance,
            })?;
        Ok(self.entry(-signed, kind, reference, layaway, now))
    }

    fn entry(
        &mut self,
        amount: i64,
        kind: TransactionKind,
        reference: Option<String>,
        layaway: Option<LayawayId>,
        now: DateTime<Utc>,
    ) -> SavingsTransaction {
        self.entry_count += 1;
        self.updated_at = now;
        SavingsTransaction {
            id: EntryId::new(),
            user: self.user,
            seq: self.entry_count,
            kind,
            amount,
            reference: reference.filter(|r| !r.trim().is_empty()),
            layaway,
            created_at: now,
        }
    }
}

/// Sum of a ledger. Equals the cached balance of a consistent account.
pub fn replay_balance(entries: &[SavingsTransaction]) -> i64 {
    entries.iter().map(|e| e.amount).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

/// A member's request to withdraw savings; processed by operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: RefundId,
    pub user: UserId,
    pub amount: Money,
    pub status: RefundStatus,
    pub reason: String,
    pub admin_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl RefundRequest {
    pub fn open(
        account: &SavingsAccount,
        amount: Money,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "Refund amount must be positive.".to_string(),
            ));
        }
        if amount > account.balance {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: account.balance,
            });
        }
        Ok(Self {
            id: RefundId::new(),
            user: account.user,
            amount,
            status: RefundStatus::Pending,
            reason: reason.into(),
            admin_notes: String::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_appends_positive_entry() {
        let now = Utc::now();
        let mut account = SavingsAccount::new(UserId::new(), now);
        let entry = account
            .credit(Money::new(7_000), TransactionKind::Deposit, Some("MM-1".into()), None, now)
            .unwrap();
        assert_eq!(account.balance, Money::new(7_000));
        assert_eq!(entry.amount, 7_000);
        assert_eq!(entry.seq, 1);
        assert_eq!(entry.reference.as_deref(), Some("MM-1"));
    }

    #[test]
    fn test_credit_rejects_zero() {
        let now = Utc::now();
        let mut account = SavingsAccount::new(UserId::new(), now);
        assert!(matches!(
            account.credit(Money::ZERO, TransactionKind::Deposit, None, None, now),
            Err(Error::InvalidAmount(_))
        ));
        assert_eq!(account.entry_count, 0);
    }

    #[test]
    fn test_credit_past_ledger_range_leaves_account() {
        let now = Utc::now();
        let max = Money::new(i64::MAX as u64);
        let mut account = SavingsAccount::new(UserId::new(), now);
        account
            .credit(max, TransactionKind::Deposit, None, None, now)
            .unwrap();

        assert!(matches!(
            account.credit(Money::new(1), TransactionKind::Deposit, None, None, now),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            account.credit(max, TransactionKind::Deposit, None, None, now),
            Err(Error::InvalidAmount(_))
        ));
        assert_eq!(account.balance, max);
        assert_eq!(account.entry_count, 1);
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let now = Utc::now();
        let mut account = SavingsAccount::new(UserId::new(), now);
        account
            .credit(Money::new(5_000), TransactionKind::Deposit, None, None, now)
            .unwrap();

        let result = account.debit(Money::new(5_001), TransactionKind::Withdrawal, None, None, now);
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance { available: Money(5_000), .. })
        ));
        assert_eq!(account.balance, Money::new(5_000));
        assert_eq!(account.entry_count, 1);
    }

    #[test]
    fn test_balance_matches_replayed_log() {
        let now = Utc::now();
        let layaway = LayawayId::new();
        let mut account = SavingsAccount::new(UserId::new(), now);
        let entries = vec![
            account.credit(Money::new(20_000), TransactionKind::Deposit, None, None, now).unwrap(),
            account
                .debit(Money::new(10_000), TransactionKind::CancelPenalty, None, Some(layaway), now)
                .unwrap(),
            account.credit(Money::new(3_000), TransactionKind::LayawayRefund, None, Some(layaway), now).unwrap(),
        ];
        assert_eq!(replay_balance(&entries), 13_000);
        assert_eq!(account.balance, Money::new(13_000));
        assert_eq!(entries[1].amount, -10_000);
        assert_eq!(entries[2].seq, 3);
    }

    #[test]
    fn test_refund_request_bounded_by_balance() {
        let now = Utc::now();
        let mut account = SavingsAccount::new(UserId::new(), now);
        account
            .credit(Money::new(1_000), TransactionKind::Deposit, None, None, now)
            .unwrap();

        assert!(matches!(
            RefundRequest::open(&account, Money::new(1_001), "", now),
            Err(Error::InsufficientBalance { .. })
        ));
        let refund = RefundRequest::open(&account, Money::new(1_000), "school fees", now).unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.user, account.user);
    }
}
