// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Error taxonomy for the pipeline runtime.
//!
//! `ConduitError` is the top-level error type returned across crate boundaries.
//! Narrower errors (`TopologyError`, `PluginLoadError`, `BufferError`,
//! `PeerForwardingError`) are produced by individual components and nest into
//! `ConduitError` via `#[from]` so callers who only care about one component's
//! failures can match on the narrow type without widening first.

use thiserror::Error;

/// Top-level error returned by the pipeline assembly and execution engine.
#[derive(Debug, Error)]
pub enum ConduitError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("processor error: {0}")]
    Processor(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    PeerForwarding(#[from] PeerForwardingError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConduitError {
    pub fn processor<S: Into<String>>(msg: S) -> Self {
        ConduitError::Processor(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        ConduitError::Sink(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ConduitError::Internal(msg.into())
    }

    /// Coarse category used by exit-code mapping and metrics labelling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConduitError::Topology(_) => ErrorCategory::Topology,
            ConduitError::PluginLoad(_) => ErrorCategory::PluginLoad,
            ConduitError::Buffer(e) if e.is_control_signal() => ErrorCategory::Control,
            ConduitError::Buffer(_) => ErrorCategory::Runtime,
            ConduitError::Processor(_) | ConduitError::Sink(_) => ErrorCategory::Runtime,
            ConduitError::PeerForwarding(_) => ErrorCategory::Runtime,
            ConduitError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the failure can be contained without aborting the containing
    /// pipeline (stage-level recovery) versus requiring pipeline-level or
    /// process-level unwind.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Control | ErrorCategory::Runtime
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Topology,
    PluginLoad,
    Control,
    Runtime,
    Internal,
}

/// Fatal-at-startup errors produced by the topology validator (C3).
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("pipeline name is empty")]
    EmptyName,

    #[error("duplicate pipeline name: {0}")]
    DuplicateName(String),

    #[error("pipeline '{from}' references unknown pipeline '{to}'")]
    UnknownReference { from: String, to: String },

    #[error("cycle detected in inter-pipeline reference graph: {0:?}")]
    Cycle(Vec<String>),

    #[error("pipeline '{0}' is missing a required field: {1}")]
    MissingField(String, &'static str),

    #[error("duplicate key '{0}' in topology document")]
    DuplicateKey(String),

    #[error("failed to parse topology document: {0}")]
    ParseError(String),
}

/// Errors produced by the plugin factory (C1) while instantiating plugins.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("unknown plugin '{0}' for kind {1:?}")]
    UnknownPlugin(String, PluginKind),

    #[error("configuration rejected for plugin '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("constructor for plugin '{name}' failed: {reason}")]
    ConstructorFailed { name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Source,
    Buffer,
    Processor,
    Sink,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginKind::Source => "source",
            PluginKind::Buffer => "buffer",
            PluginKind::Processor => "processor",
            PluginKind::Sink => "sink",
        };
        write!(f, "{s}")
    }
}

/// Buffer-level signals. `Full` and `Closed` are backpressure/shutdown
/// control signals, not failures — callers should check
/// [`BufferError::is_control_signal`] before logging at error level.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer is full")]
    Full,

    #[error("buffer is closed")]
    Closed,
}

impl BufferError {
    pub fn is_control_signal(&self) -> bool {
        matches!(self, BufferError::Full | BufferError::Closed)
    }
}

/// Errors produced by the peer-forwarding decorator (C5).
#[derive(Debug, Error)]
pub enum PeerForwardingError {
    #[error("timed out forwarding to peer {peer_id}")]
    Timeout { peer_id: String },

    #[error("no peer owns key hash {0}")]
    PeerAbsent(u64),

    #[error("retries exhausted after {attempts} attempts, {dropped} records dropped")]
    RetriesExhausted { attempts: u32, dropped: usize },
}

impl From<std::io::Error> for ConduitError {
    fn from(e: std::io::Error) -> Self {
        ConduitError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ConduitError {
    fn from(e: serde_json::Error) -> Self {
        ConduitError::Internal(format!("json error: {e}"))
    }
}
