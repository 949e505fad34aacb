//! Utility modules
//!
//! Timestamp parsing and log rate limiting helpers shared by the pipeline.

pub mod log_rate_limiter;
pub mod time;

pub use log_rate_limiter::LogRateLimiter;
pub use time::{now_timestamp_string, parse_event_time};
