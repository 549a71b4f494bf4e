//! Shared utilities for the Aqueduct bridge.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::now_secs;
