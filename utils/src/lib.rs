//! Shared utilities for the Ember wallet.

pub mod backoff;
pub mod logging;
pub mod stats;

pub use backoff::Backoff;
pub use logging::{init_logging, LogFormat};
pub use stats::StatsCounter;
