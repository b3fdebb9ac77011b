//! Application layer containing the business flows.
//!
//! [`engine::LayawayEngine`] is the single entry point. Each sibling module
//! adds one group of operations to it: savings ledger, membership
//! lifecycle, layaway lifecycle, payment reconciliation and eligibility.

pub mod eligibility;
pub mod engine;
mod layaway;
mod ledger;
mod membership;
mod payments;

pub use eligibility::Eligibility;
pub use engine::{Clock, LayawayEngine, SweepReport};
