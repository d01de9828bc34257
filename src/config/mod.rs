//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (limits, timeouts, backoff parameters)
//! - `DispatcherConfig`, the library's configuration
//! - CLI option types and parsing

mod cli;
mod constants;
mod types;

// Re-export all constants
pub use cli::{parse_param, Cli};
pub use constants::*;
pub use types::{DispatcherConfig, LogFormat, LogLevel};
