// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design:
//!
//! 1. `parser::parse_cli()` — parse argv with clap.
//! 2. `validator::SecureArgParser` — canonicalize and security-check every
//!    path-typed argument.
//! 3. [`ValidatedCli`] — the safe, validated result the rest of the
//!    application consumes.

pub mod parser;
pub mod validator;

pub use parser::{Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration: every path has been canonicalized and every
/// numeric value range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub workers: Option<usize>,
    pub channel_depth: Option<usize>,
    pub grace_period_secs: Option<u64>,
    pub metrics_addr: Option<String>,
}

/// Validated command variants: the `run` command plus the `validate`
/// supplemental subcommand.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    /// Build and run every pipeline in the topology document at `topology`.
    Run { topology: PathBuf },
    /// Validate the topology document at `topology` without running it.
    Validate { topology: PathBuf },
}

/// Parses argv and applies security validation in one step.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parser::parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        Some(SecureArgParser::validate_path(&path.to_string_lossy())?)
    } else {
        None
    };

    if let Some(workers) = cli.workers {
        if workers == 0 || workers > 1024 {
            return Err(ParseError::InvalidValue {
                arg: "workers".to_string(),
                reason: "must be between 1 and 1024".to_string(),
            });
        }
    }

    if let Some(depth) = cli.channel_depth {
        if depth == 0 {
            return Err(ParseError::InvalidValue {
                arg: "channel-depth".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
    }

    if let Some(ref addr) = cli.metrics_addr {
        SecureArgParser::validate_argument(addr)?;
    }

    let command = match cli.command {
        Commands::Run { topology } => {
            let validated = SecureArgParser::validate_path(&topology.to_string_lossy())?;
            ValidatedCommand::Run { topology: validated }
        }
        Commands::Validate { topology } => {
            let validated = SecureArgParser::validate_path(&topology.to_string_lossy())?;
            ValidatedCommand::Validate { topology: validated }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        workers: cli.workers,
        channel_depth: cli.channel_depth,
        grace_period_secs: cli.grace_period_secs,
        metrics_addr: cli.metrics_addr,
    })
}
