//! Per-connection session state.
//!
//! Sequence counters, outstanding acks and the latest sensor values. Each
//! [`Drone`](crate::Drone) owns one of each behind short-lived locks.

pub mod pending;
pub mod sensors;
pub mod sequence;

pub use pending::PendingAcks;
pub use sensors::SensorStore;
pub use sequence::SequenceTracker;
