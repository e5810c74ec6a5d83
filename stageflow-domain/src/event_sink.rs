// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The observability port pipelines emit wide events through.

use async_trait::async_trait;
use serde_json::Value;

/// A sink for the engine's wide-event stream (`pipeline.*`, `stage.*`, and
/// caller-defined event types such as `auth.*`/`stream.*`).
///
/// Implementations live in the runtime crate (or a host application); this
/// trait is defined here, alongside the rest of the domain's external
/// contracts, so the executor can depend on the port without depending on
/// any particular logging or metrics backend.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits one event. `event_type` is a dotted name (`"stage.fetch.started"`);
    /// `data` is the event's free-form payload. Implementations must not
    /// propagate emission failures back into the run — a broken sink should
    /// degrade observability, not correctness — so this method has no
    /// `Result` return.
    async fn emit(&self, event_type: &str, data: Value);
}
