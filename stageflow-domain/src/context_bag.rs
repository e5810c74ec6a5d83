// /////////////////////////////////////////////////////////////////////////////
// Stageflow
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////
//! The shared, conflict-detecting output store for a single run.

use crate::error::StageflowError;
use parking_lot::RwLock;
use serde_json::Value;

struct Entry {
    key: String,
    value: Value,
    writer: String,
}

/// A concurrent key/value store scoped to one pipeline run, enforcing that
/// each key is written by exactly one stage.
///
/// Reads never block writers and vice versa for long: the whole bag is
/// guarded by a single lock, matching this crate's preference for one
/// coarse lock over many fine-grained ones when contention is low (a
/// pipeline run has at most a few dozen stages writing a handful of keys
/// each).
pub struct ContextBag {
    entries: RwLock<Vec<Entry>>,
}

impl ContextBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    /// Records `writer`'s value for `key`.
    ///
    /// # Errors
    /// Returns [`StageflowError::ContractConflict`] if `key` was already
    /// written by a *different* stage. The same stage writing the same key
    /// twice (e.g. a retried attempt) is allowed and simply overwrites.
    pub fn insert(&self, key: impl Into<String>, value: Value, writer: impl Into<String>) -> Result<(), StageflowError> {
        let key = key.into();
        let writer = writer.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|e| e.key == key) {
            if existing.writer != writer {
                return Err(StageflowError::ContractConflict {
                    key,
                    first_writer: existing.writer.clone(),
                    second_writer: writer,
                });
            }
            existing.value = value;
            return Ok(());
        }
        entries.push(Entry { key, value, writer });
        Ok(())
    }

    /// Reads the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().iter().find(|e| e.key == key).map(|e| e.value.clone())
    }

    /// Returns the stage name that wrote `key`, if any.
    pub fn writer_of(&self, key: &str) -> Option<String> {
        self.entries.read().iter().find(|e| e.key == key).map(|e| e.writer.clone())
    }

    /// Snapshots the full bag as key/value pairs, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries.read().iter().map(|e| (e.key.clone(), e.value.clone())).collect()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextBag {
    fn default() -> Self {
        Self::new()
    }
}
