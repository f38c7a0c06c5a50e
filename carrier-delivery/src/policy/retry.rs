//! Retry policy for delivery attempts.
//!
//! Attempts are counted before they are judged: the attempt that fails is
//! included in the count compared against the limit. Backoff grows from the
//! record's previous schedule, not from the wall clock, so a slow or
//! infrequent processor does not shift the intended cadence.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Largest exponent applied to the backoff unit. Keeps delays (about two
/// years with a one minute unit) inside the fixed-width timestamp range.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Attempt limit and backoff for queued emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after which a failing email is marked failed for good.
    ///
    /// Default: 5 attempts
    #[serde(default = "defaults::attempt_limit")]
    pub attempt_limit: u32,

    /// Unit of the exponential backoff (in seconds).
    ///
    /// The delay after attempt `n` is `unit * 2^n`.
    ///
    /// Default: 60 seconds (1 minute)
    #[serde(default = "defaults::backoff_unit_secs")]
    pub backoff_unit_secs: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_limit: defaults::attempt_limit(),
            backoff_unit_secs: defaults::backoff_unit_secs(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a failure on attempt number `attempts` (already counted) is final
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.attempt_limit
    }

    /// Delay to add after attempt number `attempts`
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> TimeDelta {
        let factor = 1_i64 << attempts.min(MAX_BACKOFF_EXPONENT);
        TimeDelta::seconds(i64::from(self.backoff_unit_secs) * factor)
    }

    /// When a record that failed attempt number `attempts` becomes due again
    ///
    /// Returns `None` if the result is not representable.
    #[must_use]
    pub fn next_attempt_at(
        &self,
        previous: DateTime<Utc>,
        attempts: u32,
    ) -> Option<DateTime<Utc>> {
        previous.checked_add_signed(self.backoff(attempts))
    }
}

mod defaults {
    pub const fn attempt_limit() -> u32 {
        5
    }

    pub const fn backoff_unit_secs() -> u32 {
        60 // 1 minute
    }
}
