// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # conduit-domain
//!
//! Pure domain layer for conduit's streaming pipeline runtime: the plugin
//! contracts (`Source`/`Buffer`/`Processor`/`Sink`), the topology model
//! (`PluginSpec`/`PipelineSpec`/`TopologySpec`), the `Record` envelope, and
//! the `ConduitError` taxonomy.
//!
//! This crate has no async runtime dependency beyond `async-trait`, which is
//! used only to declare the plugin contracts as ports; it performs no I/O.

pub mod error;
pub mod plugin;
pub mod record;
pub mod topology;

pub use error::{
    BufferError, ConduitError, ErrorCategory, PeerForwardingError, PluginKind, PluginLoadError,
    TopologyError,
};
pub use plugin::{Buffer, BufferWriter, Processor, ProcessorCapabilities, Sink, Source};
pub use record::{Batch, Record};
pub use topology::{PipelineSpec, PluginSpec, TopologySpec, PIPELINE_LINK_NAME};
