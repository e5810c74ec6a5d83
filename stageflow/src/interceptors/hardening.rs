// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Development-mode-only monitors: oversized context payloads and
//! suspiciously large single values that likely belong compressed
//! out-of-band rather than inlined in the context bag.

use async_trait::async_trait;

use crate::context::StageContext;
use crate::interceptor::{AfterDecision, Interceptor};
use stageflow_domain::{StageEvent, StageOutput};

/// Warns (never fails a run) when a stage's output looks likely to bloat
/// the context bag, logging via `tracing` and firing a best-effort
/// `stream.buffer_overflow` wide event. Gated on `development_mode`; in
/// release mode this interceptor should simply not be registered, rather
/// than registered and silently downgraded, so the check is skipped
/// entirely rather than performed-but-ignored.
pub struct HardeningInterceptor {
    development_mode: bool,
    max_value_bytes: usize,
}

impl HardeningInterceptor {
    /// Builds a hardening interceptor. `max_value_bytes` is the threshold
    /// above which a single context value triggers a warning.
    pub fn new(development_mode: bool, max_value_bytes: usize) -> Self {
        Self { development_mode, max_value_bytes }
    }
}

#[async_trait]
impl Interceptor for HardeningInterceptor {
    fn name(&self) -> &str {
        "hardening"
    }

    fn priority(&self) -> i32 {
        1000
    }

    async fn after_stage(&self, ctx: &StageContext, output: StageOutput) -> AfterDecision {
        let mut output = output;
        if self.development_mode {
            let mut flagged = Vec::new();
            for (key, value) in &output.data {
                let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
                if size > self.max_value_bytes {
                    tracing::warn!(
                        stage = ctx.stage_name(),
                        key,
                        size_bytes = size,
                        "context value exceeds the recommended inline size; consider storing it out-of-band"
                    );
                    ctx.try_emit(
                        "stream.buffer_overflow",
                        serde_json::json!({ "key": key, "size_bytes": size, "limit_bytes": self.max_value_bytes }),
                    );
                    flagged.push((key.clone(), size));
                }
            }
            for (key, size) in flagged {
                output = output.with_event(StageEvent::new(
                    "buffer_overflow",
                    serde_json::json!({ "key": key, "size_bytes": size, "limit_bytes": self.max_value_bytes }),
                ));
            }
        }
        AfterDecision::Continue(output)
    }
}
