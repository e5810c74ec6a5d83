// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Enforces a per-stage execution deadline.

use async_trait::async_trait;
use std::time::Duration;

use crate::interceptor::Interceptor;

/// Declares a deadline the chain enforces with [`tokio::time::timeout`]
/// around the stage's execution (including any retries the chain performs
/// for that same invocation). Exceeding the deadline cancels the in-flight
/// stage future at its next suspension point and turns the invocation into
/// a failure.
pub struct TimeoutInterceptor {
    limit: Duration,
    priority: i32,
}

impl TimeoutInterceptor {
    /// Builds a timeout interceptor enforcing `limit` per stage invocation.
    pub fn new(limit: Duration) -> Self {
        Self { limit, priority: -100 }
    }

    /// Overrides this interceptor's chain priority (default: very low, so
    /// it wraps as much of the chain's other work as possible).
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    fn name(&self) -> &str {
        "timeout"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.limit)
    }
}
