// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Outgoing request rate limiting for metered embedding APIs

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Requests-per-minute limiter shared by clones of one adapter
#[derive(Clone)]
pub struct EmbedRateLimiter {
    limiter: Arc<GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    requests_per_minute: u32,
}

impl EmbedRateLimiter {
    /// Zero falls back to 60 requests per minute
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN.saturating_add(59));
        Self {
            limiter: Arc::new(GovRateLimiter::direct(Quota::per_minute(rpm))),
            requests_per_minute: rpm.get(),
        }
    }

    /// True if a request may go out right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait until a request is allowed
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}
