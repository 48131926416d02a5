//! Shared utilities for tangle nodes.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingError};
