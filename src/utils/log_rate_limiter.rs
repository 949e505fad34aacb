//! Per-key log throttling.
//!
//! A burst of identical drop warnings (e.g. a shipper emitting broken lines)
//! collapses into one line per window carrying the suppressed count.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub should_emit: bool,
    pub suppressed_since_last_emit: u64,
}

#[derive(Debug, Clone)]
struct LimiterState {
    last_emit: Instant,
    suppressed: u64,
}

#[derive(Debug, Clone)]
pub struct LogRateLimiter {
    window: Duration,
    states: HashMap<&'static str, LimiterState>,
}

impl LogRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            states: HashMap::new(),
        }
    }

    pub fn should_emit(&mut self, key: &'static str) -> RateLimitDecision {
        self.should_emit_at(key, Instant::now())
    }

    pub fn should_emit_at(&mut self, key: &'static str, now: Instant) -> RateLimitDecision {
        let Some(state) = self.states.get_mut(key) else {
            self.states.insert(
                key,
                LimiterState {
                    last_emit: now,
                    suppressed: 0,
                },
            );
            return RateLimitDecision {
                should_emit: true,
                suppressed_since_last_emit: 0,
            };
        };

        if now.saturating_duration_since(state.last_emit) >= self.window {
            let suppressed = std::mem::take(&mut state.suppressed);
            state.last_emit = now;
            RateLimitDecision {
                should_emit: true,
                suppressed_since_last_emit: suppressed,
            }
        } else {
            state.suppressed = state.suppressed.saturating_add(1);
            RateLimitDecision {
                should_emit: false,
                suppressed_since_last_emit: 0,
            }
        }
    }
}
