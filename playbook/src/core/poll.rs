//! Bounded, cancellable polling.
//!
//! Defaults poll every three seconds forever; attempts, deadline and backoff
//! are opt-in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            multiplier: 1.0,
            max_interval: Duration::from_secs(60),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Delay after the `attempt`-th probe (1-based).
    ///
    /// A multiplier below 1.0 (or NaN) means a fixed interval.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = if self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1);
        let factor = multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let secs = self.interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval.max(self.interval);
        }
        Duration::from_secs_f64(secs)
    }
}

/// Shared flag that stops a poll loop before its next probe.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("polling cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("gave up after {attempts} attempt(s)")]
    AttemptsExhausted { attempts: u32 },
    #[error("deadline of {deadline:?} exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },
}

/// Call `probe` until it yields a value, sleeping per `policy` in between.
///
/// Probe errors end the loop immediately. Elapsed time is the larger of wall
/// clock and total requested sleep, so a sleeper that returns early still
/// honors the deadline.
pub fn poll_until<T, F>(
    policy: &PollPolicy,
    cancel: &CancelToken,
    sleeper: &dyn Sleeper,
    mut probe: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<Option<T>>,
{
    let started = Instant::now();
    let mut slept = Duration::ZERO;
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled { attempts: attempt }.into());
        }
        attempt += 1;
        if let Some(value) = probe(attempt)? {
            return Ok(value);
        }
        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(WaitError::AttemptsExhausted { attempts: attempt }.into());
        }
        let delay = policy.delay_for(attempt);
        if let Some(deadline) = policy.deadline {
            let elapsed = started.elapsed().max(slept);
            if elapsed + delay > deadline {
                return Err(WaitError::DeadlineExceeded {
                    deadline,
                    attempts: attempt,
                }
                .into());
            }
        }
        debug!(attempt, delay_ms = delay.as_millis() as u64, "not settled; sleeping");
        sleeper.sleep(delay);
        slept += delay;
    }
}
