// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded exponential backoff and per-call deadlines
//!
//! Every suspending collaborator call goes through [`with_deadline`]; calls to
//! vectorizers and the generator additionally go through [`RetryPolicy::run`],
//! which retries only errors reporting `is_retryable()`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::RagError;

/// Retry policy with bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * exp).min(u64::MAX as f64);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last error together with the number of attempts made.
    pub async fn run<F, Fut, T>(&self, label: &str, mut op: F) -> Result<T, (RagError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {}ms",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

/// Await `fut` with a deadline; on expiry return `on_timeout()`
pub async fn with_deadline<Fut, T>(
    deadline: Duration,
    fut: Fut,
    on_timeout: impl FnOnce() -> RagError,
) -> Result<T, RagError>
where
    Fut: Future<Output = Result<T, RagError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

/// Serde helper: durations as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
