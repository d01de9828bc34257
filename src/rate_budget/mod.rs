//! Rate budgeting.
//!
//! This module provides:
//! - `RateWindow`, a (capacity, duration) rule and its `"<n>:<seconds>"` grammar
//! - `RateBudget`, which grants units only when every window admits them
//! - `ServerThrottleState`, the server's own view parsed from rate-limit headers
//! - `SlidingWindowLimiter`, an optional advisory limiter in front of the budget

mod budget;
pub mod headers;
mod sliding;
mod window;

pub use budget::RateBudget;
pub use headers::{ObservedWindow, RateLimitScope, ServerThrottleState};
pub use sliding::SlidingWindowLimiter;
pub use window::RateWindow;
