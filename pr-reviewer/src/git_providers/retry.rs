//! Retry policy for review API calls.
//!
//! Whether a failed call may be repeated depends on what the call does, not
//! only on how it failed:
//! - `Safe` reads are retried on any transient transport error;
//! - `CreateOnce` writes are retried only when the request never left the
//!   client (connect failure), since a timeout may hide a created object;
//! - `NotIdempotent` calls (review submit) are never retried.
//!
//! Protocol and client-side errors are never retried.

use std::time::Duration;

use crate::errors::{Error, TransportError};

/// Idempotency class of one API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Safe,
    CreateOnce,
    NotIdempotent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// `attempt` is zero-based: 0 is the call that just failed first.
    pub fn should_retry(&self, class: Idempotency, err: &Error, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match class {
            Idempotency::Safe => err.is_retryable(),
            Idempotency::CreateOnce => err.is_connect_failure(),
            Idempotency::NotIdempotent => false,
        }
    }

    /// Backoff before retry number `attempt + 1`; a server-sent
    /// `Retry-After` wins when present.
    pub fn delay_for(&self, attempt: u32, err: &Error) -> Duration {
        if let Error::Transport(TransportError::RateLimited {
            retry_after_secs: Some(secs),
        }) = err
        {
            return Duration::from_secs(*secs).min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
