// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The immutable input snapshot every stage in a run observes.

use crate::identity::{CallerIdentity, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One turn of a conversational input, ordered as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message (e.g. `"user"`, `"assistant"`, `"system"`).
    pub role: String,
    /// The message body.
    pub content: String,
    /// When this message was produced.
    pub timestamp: DateTime<Utc>,
    /// Free-form, engine-opaque metadata attached to this message.
    pub metadata: HashMap<String, Value>,
}

impl Message {
    /// Builds a message, stamping the current time and with empty metadata.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into(), timestamp: Utc::now(), metadata: HashMap::new() }
    }

    /// Attaches metadata to this message.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An immutable snapshot of a pipeline run's inputs, taken once at the start
/// of the run (or subrun fork) and never mutated afterward.
///
/// Identity fields come first, then the caller-supplied identity bundle,
/// then the business fields (`input_text`, `messages`, `extensions`), then
/// free-form `metadata` — mirroring how entity structs in this codebase
/// group fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// The run this snapshot belongs to.
    pub run_id: RunId,
    /// Opaque caller-supplied identifiers travelling with the run.
    pub caller: CallerIdentity,
    /// Opaque topology label, never interpreted by the engine.
    pub topology: Option<String>,
    /// Opaque execution-mode label, never interpreted by the engine.
    pub execution_mode: Option<String>,
    /// The run's primary free-text input, as supplied by the caller.
    pub input_text: String,
    /// Ordered conversational turns supplied by the caller.
    pub messages: Vec<Message>,
    /// Opaque, application-defined payloads keyed by string. The engine
    /// never interprets these; they exist so applications can thread
    /// domain-specific enrichments through the snapshot without the engine
    /// needing to know their shape.
    pub extensions: HashMap<String, Value>,
    /// Free-form metadata, distinct from `extensions` in intent only: this
    /// is for bookkeeping (tags, trace ids, client versions), not payloads.
    pub metadata: HashMap<String, Value>,
    /// When this snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Builds a new snapshot for a fresh run, stamping the current time.
    pub fn new(run_id: RunId, caller: CallerIdentity, input_text: impl Into<String>) -> Self {
        Self {
            run_id,
            caller,
            topology: None,
            execution_mode: None,
            input_text: input_text.into(),
            messages: Vec::new(),
            extensions: HashMap::new(),
            metadata: HashMap::new(),
            taken_at: Utc::now(),
        }
    }

    /// Attaches a topology label.
    #[must_use]
    pub fn with_topology(mut self, topology: impl Into<String>) -> Self {
        self.topology = Some(topology.into());
        self
    }

    /// Attaches an execution-mode label.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = Some(mode.into());
        self
    }

    /// Attaches the ordered conversational turns.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Attaches application-defined extension payloads.
    #[must_use]
    pub fn with_extensions(mut self, extensions: HashMap<String, Value>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Attaches free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reads a single value by key, checking `extensions` first and falling
    /// back to `metadata`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key).or_else(|| self.metadata.get(key))
    }

    /// Returns an owned clone of this snapshot's extensions, independent of
    /// the original; useful for callers building a derived snapshot (e.g. a
    /// subrun that overrides part of the extensions while keeping the rest).
    pub fn freeze_extensions(&self) -> HashMap<String, Value> {
        self.extensions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContextSnapshot {
        let mut extensions = HashMap::new();
        extensions.insert("query".to_string(), Value::String("hello".into()));
        ContextSnapshot::new(RunId::new(), CallerIdentity::default(), "Hello")
            .with_topology("fan-out")
            .with_execution_mode("sync")
            .with_extensions(extensions)
            .with_messages(vec![Message::new("user", "Hello")])
    }

    #[test]
    fn round_trips_through_json() {
        let snapshot = sample();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: ContextSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.run_id, back.run_id);
        assert_eq!(snapshot.topology, back.topology);
        assert_eq!(snapshot.input_text, back.input_text);
        assert_eq!(snapshot.messages.len(), back.messages.len());
        assert_eq!(snapshot.get("query"), back.get("query"));
    }

    #[test]
    fn freeze_extensions_is_an_independent_copy() {
        let snapshot = sample();
        let mut frozen = snapshot.freeze_extensions();
        frozen.insert("new".into(), Value::Bool(true));
        assert!(snapshot.get("new").is_none());
    }

    #[test]
    fn get_falls_back_to_metadata_when_absent_from_extensions() {
        let mut metadata = HashMap::new();
        metadata.insert("trace_id".to_string(), Value::String("abc".into()));
        let snapshot = ContextSnapshot::new(RunId::new(), CallerIdentity::default(), "").with_metadata(metadata);
        assert_eq!(snapshot.get("trace_id"), Some(&Value::String("abc".into())));
    }
}
