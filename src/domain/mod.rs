//! Domain layer types and invariants.

pub mod messages;
pub mod regions;
pub mod types;
