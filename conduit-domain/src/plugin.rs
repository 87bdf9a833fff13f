// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Plugin contracts (ports) consumed by the pipeline runtime: `Source`,
//! `Buffer`, `Processor`, `Sink`. All are `Send + Sync` so a single shared
//! instance can be safely invoked from multiple worker tasks.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BufferError, ConduitError};
use crate::record::{Batch, Record};

/// A long-lived task that produces records into a write target (the
/// pipeline's buffer, or a [`crate::plugin::Buffer`]-shaped sink in the case
/// of a pipeline connector). Concurrency within a source is the plugin's own
/// business; the runtime only gives it a start/stop signal.
#[async_trait]
pub trait Source: Send + Sync {
    /// Runs until `stop_signal` resolves or the source exhausts its input,
    /// writing every produced record into `target`.
    async fn start(
        &self,
        target: std::sync::Arc<dyn BufferWriter>,
        stop_signal: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ConduitError>;

    async fn stop(&self) -> Result<(), ConduitError>;
}

/// The write half of a [`Buffer`], abstracted so a [`Source`] and a
/// pipeline connector acting as a sink share one write path.
#[async_trait]
pub trait BufferWriter: Send + Sync {
    async fn write(&self, record: Record) -> Result<(), BufferError>;
    async fn write_batch(&self, batch: Batch) -> Result<(), BufferError>;
}

/// Thread-safe bounded buffer sitting between a source and a processor
/// worker pool.
#[async_trait]
pub trait Buffer: BufferWriter {
    /// Reads a batch, blocking up to `max_wait` accumulating records before
    /// returning whatever is available (possibly empty).
    async fn read(&self, max_wait: Duration) -> Result<Batch, BufferError>;

    /// Acknowledges a previously read batch, advancing the buffer's
    /// committed position.
    async fn commit(&self, batch: &Batch) -> Result<(), BufferError>;

    /// Signals the buffer closed; subsequent writes fail with
    /// [`BufferError::Closed`].
    async fn close(&self);
}

/// Capabilities a processor type declares, probed before any instance of
/// the type is constructed since the instance count depends on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorCapabilities {
    /// Requires one dedicated instance per worker rather than one instance
    /// shared across all workers.
    pub single_thread: bool,
    /// Requires wrapping with the peer-forwarding decorator so that all
    /// records sharing a key are processed by the same cluster node.
    pub requires_peer_forwarding: bool,
    /// Record fields whose values are hashed to select the owning peer,
    /// meaningful only when `requires_peer_forwarding` is set.
    pub peer_forward_key_fields: Vec<String>,
}

/// A stage in a pipeline's processor chain.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError>;

    /// Declared capabilities of this processor *type*. Implementations
    /// should return a constant; the factory calls this on a freshly
    /// constructed probe instance before deciding multiplicity.
    fn capabilities(&self) -> ProcessorCapabilities {
        ProcessorCapabilities::default()
    }
}

/// The terminal stage of a pipeline.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn output(&self, batch: Batch) -> Result<(), ConduitError>;
}
