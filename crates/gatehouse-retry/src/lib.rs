//! Out-of-band retry of failed game-state flushes.
//!
//! DISCONNECT must always complete, so a flush that fails during
//! teardown can't be retried inline. Instead the user id is handed to a
//! background worker that keeps calling
//! [`GameStateService::persist_for_identity`](gatehouse_store::GameStateService::persist_for_identity)
//! with exponential backoff until it succeeds or the attempt budget runs
//! out.
//!
//! # Integration
//!
//! ```ignore
//! let retry = spawn_flush_worker(Arc::clone(&state_service), RetryConfig::default());
//! // during teardown, after a failed flush:
//! retry.enqueue(user_id)?;
//! ```

mod worker;

pub use worker::{spawn_flush_worker, FlushRetryHandle};

use std::time::Duration;

use gatehouse_protocol::UserId;
use rand::Rng;
use tracing::warn;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Backoff and capacity settings for the flush retry worker.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry. Doubles after every failure.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Attempts made before a user is abandoned. At least 1.
    pub max_attempts: u32,
    /// Random extra delay (0..=jitter) added to every schedule so a burst
    /// of disconnects doesn't retry in lockstep.
    pub jitter: Duration,
    /// Capacity of the command channel. `enqueue` fails when it's full.
    pub queue_capacity: usize,
    /// Limit on a single persist call. A call that overruns counts as a
    /// failed attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
            jitter: Duration::from_millis(250),
            queue_capacity: 1024,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`spawn_flush_worker`]. Rules:
    /// - `max_attempts` and `queue_capacity` are at least 1.
    /// - `base_delay` and `attempt_timeout` are at least 1 ms.
    /// - `max_delay` is at least `base_delay`.
    pub fn validated(mut self) -> Self {
        if self.max_attempts == 0 {
            warn!("max_attempts of 0 would never retry; using 1");
            self.max_attempts = 1;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = 1;
        }
        if self.base_delay.is_zero() {
            self.base_delay = Duration::from_millis(1);
        }
        if self.attempt_timeout.is_zero() {
            warn!("attempt_timeout of 0 would fail every attempt; using 1ms");
            self.attempt_timeout = Duration::from_millis(1);
        }
        if self.max_delay < self.base_delay {
            warn!(
                max_delay_ms = self.max_delay.as_millis() as u64,
                base_delay_ms = self.base_delay.as_millis() as u64,
                "max_delay below base_delay; raising it"
            );
            self.max_delay = self.base_delay;
        }
        self
    }

    /// Delay before attempt number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) plus a random jitter.
    pub(crate) fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        self.backoff(attempt) + jitter
    }
}

// ---------------------------------------------------------------------------
// Stats and errors
// ---------------------------------------------------------------------------

/// Counters reported by [`FlushRetryHandle::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Users whose state was eventually persisted.
    pub succeeded: u64,
    /// Individual attempts that failed.
    pub failed: u64,
    /// Users given up on after `max_attempts`.
    pub abandoned: u64,
    /// Users currently waiting for a retry.
    pub pending: usize,
}

/// Errors talking to the retry worker.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The command queue is full; the flush for this user is lost.
    #[error("retry queue full, dropping flush for {0}")]
    QueueFull(UserId),

    /// The worker has shut down.
    #[error("retry worker is not running")]
    Closed,
}
