//! Performance Controls: concurrency, timeout and retry limits for dispatch
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::perf_control::{DispatchConfig, RetryPolicy};
//!
//! let config = DispatchConfig::default();
//! let wait = config.retry.backoff_with_jitter(1, rand::random());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Fraction of the delay randomized in either direction (0.0–1.0).
    pub jitter: f64,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate the backoff delay for a given attempt number (0-indexed).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Backoff with jitter applied. `roll` is a uniform sample in `[0, 1)`.
    ///
    /// The result stays within `base * (1 ± jitter)` and never exceeds
    /// `max_backoff_ms`.
    pub fn backoff_with_jitter(&self, attempt: u32, roll: f64) -> Duration {
        let base = self.backoff_ms(attempt) as f64;
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 - jitter + 2.0 * jitter * roll.clamp(0.0, 1.0);
        let ms = (base * factor).round().max(0.0) as u64;
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    /// Whether another retry is allowed given the attempt count.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Get the backoff as a Duration for a given attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }
}

impl Default for RetryPolicy {
    /// Default: 2 retries, 500ms initial backoff, 2x multiplier, 5s max, ±20% jitter.
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            jitter: 0.2,
        }
    }
}

/// Dispatcher limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Invocations allowed in flight at once, across all batches sharing a dispatcher.
    pub max_concurrency: usize,
    /// Per-attempt deadline unless the request overrides it.
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("dispatch.max_concurrency must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("dispatch.request_timeout_secs must be positive".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("dispatch.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err("dispatch.retry.jitter must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}
