// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Reference [`Processor`] adapters exercising each multiplicity rule:
//! [`PassthroughProcessor`] is stateless and shared, [`UppercaseProcessor`]
//! declares single-thread affinity, and [`KeyedCountProcessor`] declares
//! peer-forwarding affinity.

use std::collections::HashMap;

use async_trait::async_trait;
use conduit_domain::{Batch, ConduitError, Processor, ProcessorCapabilities};
use parking_lot::Mutex;

/// Identity processor: returns the batch unchanged.
pub struct PassthroughProcessor;

#[async_trait]
impl Processor for PassthroughProcessor {
    async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError> {
        Ok(batch)
    }
}

/// Uppercases a configured string field in place. Declares single-thread
/// affinity purely to exercise the per-worker multiplicity rule — nothing
/// about uppercasing actually requires it.
pub struct UppercaseProcessor {
    field: String,
}

impl UppercaseProcessor {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl Processor for UppercaseProcessor {
    async fn execute(&self, mut batch: Batch) -> Result<Batch, ConduitError> {
        for record in &mut batch {
            if let Some(value) = record.event.get_mut(&self.field) {
                if let Some(s) = value.as_str() {
                    *value = serde_json::Value::String(s.to_uppercase());
                }
            }
        }
        Ok(batch)
    }

    fn capabilities(&self) -> ProcessorCapabilities {
        ProcessorCapabilities {
            single_thread: true,
            ..Default::default()
        }
    }
}

/// Keeps a running per-key count of records seen. Declares peer-forwarding
/// affinity on the configured key field, so the builder wraps it with
/// [`crate::decorator::PeerForwardingDecorator`].
pub struct KeyedCountProcessor {
    key_field: String,
    counts: Mutex<HashMap<String, u64>>,
}

impl KeyedCountProcessor {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn count_for(&self, key: &str) -> u64 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Processor for KeyedCountProcessor {
    async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError> {
        let mut counts = self.counts.lock();
        for record in &batch {
            if let Some(key) = record.field_str(&self.key_field) {
                *counts.entry(key.to_string()).or_insert(0) += 1;
            }
        }
        drop(counts);
        Ok(batch)
    }

    fn capabilities(&self) -> ProcessorCapabilities {
        ProcessorCapabilities {
            requires_peer_forwarding: true,
            peer_forward_key_fields: vec![self.key_field.clone()],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_domain::Record;
    use serde_json::json;

    #[tokio::test]
    async fn passthrough_leaves_batch_untouched() {
        let batch = vec![Record::new("evt", json!({"a": 1}))];
        let out = PassthroughProcessor.execute(batch.clone()).await.unwrap();
        assert_eq!(out[0].event, batch[0].event);
    }

    #[tokio::test]
    async fn uppercase_processor_upcases_configured_field() {
        let processor = UppercaseProcessor::new("name");
        let batch = vec![Record::new("evt", json!({"name": "ada"}))];
        let out = processor.execute(batch).await.unwrap();
        assert_eq!(out[0].event["name"], json!("ADA"));
        assert!(processor.capabilities().single_thread);
    }

    #[tokio::test]
    async fn keyed_count_processor_counts_per_key() {
        let processor = KeyedCountProcessor::new("user");
        let batch = vec![
            Record::new("evt", json!({"user": "a"})),
            Record::new("evt", json!({"user": "a"})),
            Record::new("evt", json!({"user": "b"})),
        ];
        processor.execute(batch).await.unwrap();
        assert_eq!(processor.count_for("a"), 2);
        assert_eq!(processor.count_for("b"), 1);
        assert!(processor.capabilities().requires_peer_forwarding);
    }
}
