//! Placement letter core: canonical snapshots, content hashing, change
//! detection, sequencing, and the amendment state machine.

pub mod booking;
pub mod canonical;
pub mod diff;
pub mod error;
pub mod record;
pub mod service;
pub mod store;
