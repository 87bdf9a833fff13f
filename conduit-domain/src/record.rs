// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The opaque event envelope that flows through every pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque envelope carrying an event plus metadata. The core never
/// inspects `event`; processors and sinks interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub event: Value,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(event_type: impl Into<String>, event: Value) -> Self {
        Self {
            event,
            event_type: event_type.into(),
            timestamp: Utc::now(),
        }
    }

    /// Read a string field out of the record's JSON payload, used by the
    /// peer-forwarding decorator to compute a key hash.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.event.get(field).and_then(Value::as_str)
    }
}

/// A group of records read together from a buffer.
pub type Batch = Vec<Record>;
