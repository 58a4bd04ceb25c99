//! Bounded exponential backoff for network-facing git operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::GitError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub base: Duration,
    pub factor: u32,
    #[serde(with = "millis")]
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(1),
            factor: 2,
            max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping. For tests and offline remotes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::ZERO,
            factor: 1,
            max: Duration::ZERO,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            factor: self.factor.max(1),
            max: self.max,
            current: self.base.min(self.max),
        }
    }
}

/// Delay sequence: base, base*factor, ... capped at max.
#[derive(Clone, Debug)]
pub struct Backoff {
    factor: u32,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.checked_mul(self.factor).unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }
}

/// Run `op` until it succeeds, fails with a non-network error, or the
/// attempt budget runs out. `on_retry` sees each failed attempt that will be
/// retried. Returns the result with the number of attempts made.
pub fn retry_network<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut(u32) -> Result<T, GitError>,
    mut on_retry: impl FnMut(u32, &GitError, Duration),
) -> (Result<T, GitError>, u32) {
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Err(err) if err.is_network() && attempt < max_attempts => {
                let delay = backoff.next_delay();
                on_retry(attempt, &err, delay);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            result => return (result, attempt),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
