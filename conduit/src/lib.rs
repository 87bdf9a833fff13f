// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Conduit
//!
//! A streaming data-processing pipeline runtime: assembles declarative
//! topologies into a validated DAG of pipelines and executes them with
//! cross-node peer forwarding for stateful processors.
//!
//! ## Control flow
//!
//! ```text
//! declarative document -> topology::document::parse (C2)
//!                       -> topology::validate (C3)
//!                       -> PipelineBuilder (C6, uses C1/C4/C5)
//!                       -> map of runnable BuiltPipeline
//!                       -> Pipeline::start() (C7) on each
//! ```
//!
//! ## Module map
//!
//! - [`registry`] — the plugin factory and registry (C1).
//! - [`topology`] — the topology validator (C3) and the supplemental,
//!   non-authoritative document loader (C2's concrete parsing).
//! - [`connector`] — the dual-role pipeline connector (C4).
//! - [`decorator`] — the peer-forwarding decorator (C5).
//! - [`builder`] — the pipeline builder (C6).
//! - [`runtime`] — the pipeline runtime (C7).
//! - [`adapters`] — bundled reference Source/Buffer/Processor/Sink
//!   implementations so a topology document has something to name.
//! - [`metrics`] — the Prometheus `/metrics` HTTP endpoint.

pub mod adapters;
pub mod builder;
pub mod connector;
pub mod decorator;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod topology;

pub use builder::{BuildReport, BuiltPipeline, PipelineBuilder};
pub use connector::{PipelineConnector, DEFAULT_CONNECTOR_CAPACITY};
pub use decorator::{
    key_hash, PeerForwarder, PeerForwardingDecorator, PeerId, RetryPolicy, StaticPeerForwarder,
};
pub use registry::{default_registry, PluginFactory, PluginRegistry, ProcessorStage};
pub use runtime::{CancellationToken, Pipeline, PipelineState};
pub use topology::{validate, ValidatedTopology};

pub use conduit_domain::{
    Batch, Buffer, BufferError, BufferWriter, ConduitError, ErrorCategory, PeerForwardingError,
    PipelineSpec, PluginKind, PluginLoadError, PluginSpec, Processor, ProcessorCapabilities,
    Record, Sink, Source, TopologyError, TopologySpec, PIPELINE_LINK_NAME,
};
