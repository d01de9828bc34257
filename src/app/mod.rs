//! Main application modules.
//!
//! This module provides utilities for URL validation, progress reporting,
//! shutdown handling, and statistics printing used by the batch runner.

pub mod progress;
pub mod shutdown;
pub mod statistics;
pub mod url;

// Re-export public API
pub use progress::{format_timing, ProgressTracker};
pub use shutdown::shutdown_gracefully;
pub use statistics::print_dispatch_statistics;
pub use url::{is_url_line, validate_url};
