// src/retry/mod.rs
mod strategy;

pub use strategy::{RetryDecision, RetryError, RetryStrategy};

use std::time::Duration;

/// Tuning for [`RetryStrategy`]'s exponential backoff. Ambient plumbing,
/// not part of the balancer's own configuration file — the dispatcher's
/// built-in 3-attempt loop and the health monitor's dead-check backoff
/// each construct their own instance with the intervals their own section
/// of the spec calls for.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}
