use crate::config::Policy;
use crate::domain::ids::{Actor, UserId};
use crate::domain::ports::{Changeset, StoreRef, UnitOfWork};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Source of the current time. Swapped for a controllable clock in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The main entry point for every membership, layaway and savings operation.
///
/// `LayawayEngine` owns the storage backend and serializes the mutating
/// flows of each user behind a per-user async lock. Every operation reads
/// the rows it needs, runs the domain transition, and commits all of its
/// writes as a single [`Changeset`]; the store rejects stale versions and
/// uniqueness violations, so nothing is ever half-applied.
///
/// The operations themselves are spread over the sibling modules
/// (`ledger`, `membership`, `layaway`, `payments`, `eligibility`).
pub struct LayawayEngine {
    store: StoreRef,
    policy: Policy,
    clock: Clock,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl LayawayEngine {
    /// Creates a new `LayawayEngine` reading the wall clock.
    ///
    /// # Arguments
    ///
    /// * `store` - The storage backend shared by all operations.
    /// * `policy` - Fees, penalties and limits to apply.
    pub fn new(store: StoreRef, policy: Policy) -> Self {
        Self {
            store,
            policy,
            clock: Arc::new(Utc::now),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Serializes mutations of one user's rows within this process.
    /// Not reentrant: never take it twice for the same user in one flow.
    pub(crate) async fn lock_user(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Holders and waiters keep a clone; a lone map reference is idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub(crate) async fn commit(&self, changes: Changeset) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.store.commit(changes).await.map_err(|e| {
            tracing::debug!(error = %e, "commit rejected");
            e.into_domain()
        })
    }
}

pub(crate) fn require_operator(actor: &Actor) -> Result<()> {
    if actor.is_operator() {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

pub(crate) fn require_access(actor: &Actor, owner: UserId) -> Result<()> {
    if actor.can_access(owner) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// Outcome of a periodic sweep. Failures are collected per item; one bad
/// row never stops the rest of the sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub transitioned: usize,
    pub failures: Vec<(String, Error)>,
}

impl SweepReport {
    pub(crate) fn record(&mut self, id: impl ToString, outcome: Result<bool>) {
        match outcome {
            Ok(true) => self.transitioned += 1,
            Ok(false) => {}
            Err(e) => {
                let id = id.to_string();
                tracing::warn!(%id, error = %e, "sweep item failed");
                self.failures.push((id, e));
            }
        }
    }
}
