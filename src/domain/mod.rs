//! Cart domain: snapshots, value objects and reconciliation events
pub mod aggregates;
pub mod events;
pub mod value_objects;
