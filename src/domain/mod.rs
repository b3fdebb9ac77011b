//! Domain layer: entities, their state machines, and the storage ports.
//!
//! Entities are plain data with transition methods that validate and mutate
//! in memory. Nothing here performs I/O; persistence goes through the
//! traits in [`ports`].

pub mod ids;
pub mod layaway;
pub mod membership;
pub mod money;
pub mod payment;
pub mod ports;
pub mod savings;
pub mod tier;
