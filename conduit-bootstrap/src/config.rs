// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Bootstrap-phase configuration structure.
//!
//! `AppConfig` holds **validated** configuration after CLI parsing and
//! security validation. It is immutable after construction so it can be
//! shared across async tasks without synchronization.
//!
//! CLI flags take precedence over `CONDUIT_*` environment variables, which
//! take precedence over the defaults baked into [`AppConfigBuilder`] — see
//! [`AppConfigBuilder::with_env_overrides`].
//!
//! ## Usage
//!
//! ```rust
//! use conduit_bootstrap::config::{AppConfig, LogLevel};
//!
//! let config = AppConfig::builder()
//!     .app_name("conduit")
//!     .log_level(LogLevel::Info)
//!     .topology_path("/etc/conduit/topology.yaml")
//!     .build();
//!
//! println!("Running: {}", config.app_name());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    /// Default.
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Default buffer capacity applied to a pipeline that omits `bufferSpec`.
pub const DEFAULT_CHANNEL_DEPTH: usize = 256;

/// Default grace period a pipeline's buffer is drained for before in-flight
/// records are dropped on shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default bind address for the Prometheus `/metrics` endpoint.
pub const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:9898";

/// Bootstrap-phase application configuration.
///
/// `topology_path` holds the path to the topology document the runtime
/// builds pipelines from; it is the sole positional argument of the `run`
/// and `validate` subcommands. `channel_depth`, `grace_period`, and
/// `metrics_addr` are the ambient runtime defaults every pipeline inherits
/// unless its own topology entry overrides them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    app_name: String,
    log_level: LogLevel,
    topology_path: Option<PathBuf>,
    worker_threads: Option<usize>,
    channel_depth: usize,
    grace_period: Duration,
    metrics_addr: String,
    verbose: bool,
    dry_run: bool,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn topology_path(&self) -> Option<&PathBuf> {
        self.topology_path.as_ref()
    }

    pub fn worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }

    pub fn channel_depth(&self) -> usize {
        self.channel_depth
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn metrics_addr(&self) -> &str {
        &self.metrics_addr
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    app_name: Option<String>,
    log_level: Option<LogLevel>,
    topology_path: Option<PathBuf>,
    worker_threads: Option<usize>,
    channel_depth: Option<usize>,
    grace_period_secs: Option<u64>,
    metrics_addr: Option<String>,
    verbose: bool,
    dry_run: bool,
}

impl AppConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn topology_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.topology_path = Some(path.into());
        self
    }

    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    pub fn channel_depth(mut self, depth: usize) -> Self {
        self.channel_depth = Some(depth);
        self
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.grace_period_secs = Some(secs);
        self
    }

    pub fn metrics_addr(mut self, addr: impl Into<String>) -> Self {
        self.metrics_addr = Some(addr.into());
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Applies `CONDUIT_*` environment variable overrides for every field
    /// not already set on this builder. CLI flags always win: call this
    /// before the CLI-flag setters above, or only invoke it for fields the
    /// CLI left `None`.
    pub fn with_env_overrides(mut self) -> Self {
        let overrides = EnvOverrides::load();
        if self.channel_depth.is_none() {
            self.channel_depth = overrides.channel_depth;
        }
        if self.grace_period_secs.is_none() {
            self.grace_period_secs = overrides.grace_period_secs;
        }
        if self.metrics_addr.is_none() {
            self.metrics_addr = overrides.metrics_addr;
        }
        if self.worker_threads.is_none() {
            self.worker_threads = overrides.worker_threads;
        }
        self
    }

    /// # Panics
    /// Panics if `app_name` was not set.
    pub fn build(self) -> AppConfig {
        AppConfig {
            app_name: self.app_name.expect("app_name is required"),
            log_level: self.log_level.unwrap_or_default(),
            topology_path: self.topology_path,
            worker_threads: self.worker_threads,
            channel_depth: self.channel_depth.unwrap_or(DEFAULT_CHANNEL_DEPTH),
            grace_period: self
                .grace_period_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            metrics_addr: self
                .metrics_addr
                .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string()),
            verbose: self.verbose,
            dry_run: self.dry_run,
        }
    }

    pub fn try_build(self) -> Result<AppConfig, String> {
        Ok(AppConfig {
            app_name: self.app_name.ok_or("app_name is required")?,
            log_level: self.log_level.unwrap_or_default(),
            topology_path: self.topology_path,
            worker_threads: self.worker_threads,
            channel_depth: self.channel_depth.unwrap_or(DEFAULT_CHANNEL_DEPTH),
            grace_period: self
                .grace_period_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            metrics_addr: self
                .metrics_addr
                .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string()),
            verbose: self.verbose,
            dry_run: self.dry_run,
        })
    }
}

/// The subset of [`AppConfig`] that may be supplied via `CONDUIT_*`
/// environment variables (e.g. `CONDUIT_CHANNEL_DEPTH`,
/// `CONDUIT_METRICS_ADDR`), layered beneath explicit CLI flags.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    channel_depth: Option<usize>,
    grace_period_secs: Option<u64>,
    metrics_addr: Option<String>,
    worker_threads: Option<usize>,
}

impl EnvOverrides {
    /// Reads `CONDUIT_*` environment variables via the `config` crate.
    /// Malformed values (e.g. a non-numeric `CONDUIT_CHANNEL_DEPTH`) are
    /// logged and ignored rather than failing bootstrap.
    fn load() -> Self {
        let built = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CONDUIT")
                    .separator("_")
                    .try_parsing(true),
            )
            .build();

        match built.and_then(|c| c.try_deserialize()) {
            Ok(overrides) => overrides,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed CONDUIT_* environment overrides");
                Self::default()
            }
        }
    }
}
