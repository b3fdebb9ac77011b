#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use layaway_ledger::application::LayawayEngine;
use layaway_ledger::config::Policy;
use layaway_ledger::domain::ids::{Actor, UserId};
use layaway_ledger::domain::membership::{PaymentInfo, PaymentMode};
use layaway_ledger::domain::money::Money;
use layaway_ledger::domain::ports::StoreRef;
use layaway_ledger::domain::tier::MembershipTier;
use layaway_ledger::infrastructure::in_memory::InMemoryStore;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A clock the test moves by hand.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
        )))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

pub struct World {
    pub engine: Arc<LayawayEngine>,
    pub clock: ManualClock,
    pub operator: Actor,
}

impl World {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), Policy::default())
    }

    pub fn with_store(store: StoreRef, policy: Policy) -> Self {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let engine = LayawayEngine::new(store, policy).with_clock(Arc::new(move || handle.now()));
        Self {
            engine: Arc::new(engine),
            clock,
            operator: Actor::operator(UserId::new()),
        }
    }

    pub async fn tier(&self, name: &str, price: u64, max_purchase_value: u64) -> MembershipTier {
        let tier = MembershipTier::new(name, Money::new(price), Money::new(max_purchase_value));
        self.engine.upsert_tier(&self.operator, tier).await.unwrap()
    }

    /// A new member holding an active subscription to `tier`.
    pub async fn member_with(&self, tier: &MembershipTier) -> (UserId, Actor) {
        let user = UserId::new();
        let member = Actor::member(user);
        let sub = self
            .engine
            .create_subscription(&member, user, tier.id, cash(tier.price))
            .await
            .unwrap();
        self.engine
            .activate_subscription(&self.operator, sub.id)
            .await
            .unwrap();
        (user, member)
    }
}

pub fn cash(amount: Money) -> PaymentInfo {
    PaymentInfo::new(PaymentMode::Cash, None, amount)
}

pub fn generate_deposit_csv(path: &Path, rows: &[(&str, &str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["user", "amount", "reference"])?;
    for (user, amount, reference) in rows {
        wtr.write_record([user, amount, reference])?;
    }

    wtr.flush()?;
    Ok(())
}
