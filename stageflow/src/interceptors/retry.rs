// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Retries a failed stage with exponential backoff and jitter.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use crate::context::StageContext;
use crate::interceptor::{ErrorDecision, Interceptor};
use stageflow_domain::StageOutput;

/// Retries a failing stage up to `max_attempts` additional times, waiting
/// `base * 2^attempt` plus random jitter between attempts.
///
/// A single instance is meant to be shared across an entire pipeline's
/// interceptor chain, so attempt counts are tracked per stage name rather
/// than in one shared counter — otherwise concurrently failing stages would
/// corrupt each other's retry budgets.
pub struct RetryInterceptor {
    max_attempts: usize,
    base: Duration,
    attempts: Mutex<HashMap<String, usize>>,
}

impl RetryInterceptor {
    /// Builds a retry interceptor allowing up to `max_attempts` retries
    /// with a `base` backoff unit.
    pub fn new(max_attempts: usize, base: Duration) -> Self {
        Self { max_attempts, base, attempts: Mutex::new(HashMap::new()) }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64;
        let exp_ms = base_ms * 2f64.powi(attempt.min(20) as i32);
        let jitter_ms = rand::rng().random_range(0.0..=exp_ms.max(1.0) / 4.0);
        Duration::from_millis((exp_ms + jitter_ms) as u64)
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    fn name(&self) -> &str {
        "retry"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn on_error(&self, ctx: &StageContext, _output: &StageOutput) -> ErrorDecision {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let slot = attempts.entry(ctx.stage_name().to_string()).or_insert(0);
            let current = *slot;
            *slot += 1;
            current
        };
        if attempt >= self.max_attempts {
            self.attempts.lock().remove(ctx.stage_name());
            return ErrorDecision::Propagate;
        }
        ErrorDecision::Retry { delay: self.backoff_for(attempt as u32), max: self.max_attempts - attempt }
    }
}
