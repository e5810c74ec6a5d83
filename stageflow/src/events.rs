// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! Concrete [`EventSink`] implementations.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use stageflow_domain::EventSink;

/// Discards every event. Useful as a default when a caller has not wired
/// up observability, or in tests where event output is not being asserted.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event_type: &str, _data: Value) {}
}

/// Forwards every event to `tracing` as a structured `info`-level event.
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Value) {
        tracing::info!(event_type, %data, "pipeline event");
    }
}

/// Records every `(event_type, data)` pair it receives, in order. Intended
/// for tests and interactive debugging, not production use — nothing
/// bounds its growth.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEventSink {
    /// Builds an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The event type names recorded so far, in emission order.
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|(kind, _)| kind.clone()).collect()
    }

    /// The full recorded `(event_type, data)` log, in emission order.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event_type: &str, data: Value) {
        self.events.lock().push((event_type.to_string(), data));
    }
}
