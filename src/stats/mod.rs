//! Runtime statistics

pub mod metrics;

pub use metrics::{RelayStats, SubscriptionStats};
