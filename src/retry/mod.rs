//! Retry policy with exponential backoff and jitter
//!
//! Wraps any external call. The jitter keeps independently-running monitors
//! from retrying in lockstep after a shared outage.

use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// How a failure should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt after backoff (timeouts, resets, hiccups).
    Transient,
    /// Retrying cannot help; propagate immediately.
    Terminal,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total number of attempts, not the number of re-tries after the first.
    pub max_retries: u32,
    /// Fraction of the base delay used as the jitter half-width.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before the attempt following `attempt` (1-based):
    /// `min(max_delay, initial_delay * multiplier^(attempt - 1))`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.powi(exponent as i32);
        let raw = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }

    /// Jittered delay: base ± (jitter_fraction × base).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let half_width = self.jitter_fraction * base;
        if half_width <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let offset = rand::rng().random_range(-half_width..=half_width);
        Duration::from_secs_f64((base + offset).max(0.0))
    }

    /// Run `op` up to `max_retries` times, classifying each failure.
    ///
    /// Terminal failures and retry exhaustion propagate the last error
    /// unchanged. The attempt number (1-based) is passed to `op`.
    pub fn run<T, E, F, C>(&self, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        C: Fn(&E) -> FailureKind,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if classify(&err) == FailureKind::Terminal {
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        warn!(attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    let wait = self.delay(attempt);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}
