//! Supervisor: component health and the background probe that keeps it fresh.

pub mod health;
pub mod probe;

pub use health::{HealthRegistry, HealthReporter, HealthSummary};
pub use probe::HealthProbe;
