// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface parsing using clap. Defines the CLI structure and
//! handles argument parsing; security validation happens in the `validator`
//! module after parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure.
#[derive(Parser, Debug, Clone)]
#[command(name = "conduit")]
#[command(about = concat!("Conduit pipeline runtime v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (CONDUIT_* environment variables also apply).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the worker count applied to every pipeline that doesn't
    /// specify its own `workers`.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Default buffer capacity for pipelines that omit `bufferSpec`.
    #[arg(long)]
    pub channel_depth: Option<usize>,

    /// Grace period (seconds) a pipeline's buffer is drained for before
    /// in-flight records are dropped on shutdown.
    #[arg(long)]
    pub grace_period_secs: Option<u64>,

    /// Bind address for the Prometheus `/metrics` endpoint.
    #[arg(long)]
    pub metrics_addr: Option<String>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build and run every pipeline described by a topology document.
    Run {
        /// Path to the topology document.
        topology: PathBuf,
    },

    /// Validate a topology document (runs the validator only) and print its
    /// build order and warnings without starting any pipeline.
    Validate {
        /// Path to the topology document.
        topology: PathBuf,
    },
}

/// Parses CLI arguments.
///
/// # Panics
///
/// Clap exits the process with a usage message if parsing fails.
pub fn parse_cli() -> Cli {
    Cli::parse()
}
