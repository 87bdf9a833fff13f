// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Conduit CLI
//!
//! Composition root: parses and validates the CLI, loads and validates a
//! topology document, builds the runnable pipelines, starts them, and waits
//! for a shutdown signal to drain them gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use conduit::decorator::{RetryPolicy, StaticPeerForwarder};
use conduit::registry::{default_registry, PluginFactory};
use conduit::runtime::Pipeline;
use conduit::{builder::PipelineBuilder, topology};
use conduit_bootstrap::config::{AppConfig, LogLevel};
use conduit_bootstrap::signals::create_signal_handler;
use conduit_bootstrap::{parse_and_validate, ValidatedCommand};
use conduit_domain::TopologyError;
use tracing_subscriber::EnvFilter;

/// Errors that can terminate the process before pipelines even start.
#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to read topology document: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("invalid metrics bind address {addr:?}: {source}")]
    MetricsAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

fn init_tracing(config: &AppConfig) {
    let default_directive = match config.log_level() {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(cli: &conduit_bootstrap::ValidatedCli) -> AppConfig {
    let mut builder = AppConfig::builder()
        .app_name("conduit")
        .log_level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .verbose(cli.verbose);

    if let Some(workers) = cli.workers {
        builder = builder.worker_threads(workers);
    }
    if let Some(depth) = cli.channel_depth {
        builder = builder.channel_depth(depth);
    }
    if let Some(secs) = cli.grace_period_secs {
        builder = builder.grace_period_secs(secs);
    }
    if let Some(ref addr) = cli.metrics_addr {
        builder = builder.metrics_addr(addr.clone());
    }

    builder.with_env_overrides().build()
}

/// Single-node default: every pipeline's peer is itself, so
/// `PeerForwardingDecorator` always takes the local-delivery path.
fn single_node_peer_forwarder() -> Arc<dyn conduit::decorator::PeerForwarder> {
    Arc::new(StaticPeerForwarder::new(
        "local",
        vec!["local".to_string()],
        StaticPeerForwarder::shared_inboxes(),
    ))
}

async fn run(topology_path: &std::path::Path, config: &AppConfig) -> Result<(), MainError> {
    let text = std::fs::read_to_string(topology_path)?;
    let spec = topology::document::parse(&text)?;
    let validated = topology::validate(&spec)?;
    for warning in &validated.warnings {
        tracing::warn!(%warning, "topology validation warning");
    }

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let report = PipelineBuilder::new(
        &spec,
        &factory,
        single_node_peer_forwarder(),
        RetryPolicy::default(),
        config.channel_depth(),
    )
    .build(&validated);

    for (name, err) in &report.failures {
        tracing::error!(pipeline = %name, error = %err, "pipeline failed to build");
    }

    let metrics_addr: SocketAddr =
        config
            .metrics_addr()
            .parse()
            .map_err(|source| MainError::MetricsAddr {
                addr: config.metrics_addr().to_string(),
                source,
            })?;
    let metrics_endpoint = conduit::metrics::MetricsEndpoint::new(metrics_addr);
    tokio::spawn(async move {
        if let Err(err) = metrics_endpoint.start().await {
            tracing::error!(error = %err, "metrics endpoint exited");
        }
    });

    let pipelines: Vec<Arc<Pipeline>> = report
        .runnable
        .into_values()
        .map(|built| Arc::new(Pipeline::from_built(built)))
        .collect();

    if pipelines.is_empty() {
        tracing::warn!("no runnable pipelines in topology; exiting");
        return Ok(());
    }

    for pipeline in &pipelines {
        tracing::info!(pipeline = pipeline.name(), "starting pipeline");
        pipeline.start().await;
    }

    let signal_handler = create_signal_handler();
    signal_handler
        .wait_for_signal(Box::new(|| {
            tracing::info!("shutdown signal received");
        }))
        .await;

    let grace_deadline = config.grace_period();
    let stop_futures = pipelines.iter().map(|pipeline| {
        let pipeline = pipeline.clone();
        async move {
            let state = pipeline.stop(grace_deadline).await;
            tracing::info!(pipeline = pipeline.name(), ?state, "pipeline stopped");
        }
    });
    futures::future::join_all(stop_futures).await;

    Ok(())
}

fn validate_only(topology_path: &std::path::Path) -> Result<(), MainError> {
    let text = std::fs::read_to_string(topology_path)?;
    let spec = topology::document::parse(&text)?;
    let validated = topology::validate(&spec)?;

    println!("topology is valid");
    println!("build order:");
    for name in &validated.build_order {
        println!("  - {name}");
    }
    if validated.warnings.is_empty() {
        println!("warnings: none");
    } else {
        println!("warnings:");
        for warning in &validated.warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match parse_and_validate() {
        Ok(cli) => cli,
        Err(err) => return conduit_bootstrap::result_to_exit_code::<(), _>(Err(err)),
    };

    let config = build_config(&cli);
    init_tracing(&config);

    let outcome = match cli.command {
        ValidatedCommand::Run { topology } => run(&topology, &config).await,
        ValidatedCommand::Validate { topology } => validate_only(&topology),
    };

    conduit_bootstrap::result_to_exit_code(outcome)
}
