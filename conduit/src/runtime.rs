// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The pipeline runtime (C7): runs a single built pipeline — source
//! thread(s) -> buffer -> processor-worker pool -> sink fan-out — enforcing
//! batch-read delay, worker count, and graceful shutdown.
//!
//! Shutdown uses a `CancellationToken`: an atomic flag paired with a
//! `tokio::sync::Notify` so waiters don't busy-poll.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_domain::{Buffer, ConduitError, Sink, Source};
use prometheus::{IntCounter, IntCounterVec, Opts};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::builder::BuiltPipeline;

/// Lifecycle states a pipeline moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Built,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Cooperative cancellation signal shared by the source task and every
/// worker. `cancel()` is idempotent.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

struct Metrics {
    records_read: IntCounter,
    records_emitted: IntCounterVec,
    sink_failures: IntCounterVec,
    processor_failures: IntCounter,
    records_dropped_on_stop: IntCounter,
}

impl Metrics {
    /// Constructs and registers one metric family per counter, scoped to
    /// this pipeline via a `pipeline` const label so `/metrics` can
    /// disambiguate counters across concurrently running pipelines.
    /// Registration failures (e.g. re-registering the same pipeline name
    /// twice within a process) are logged and otherwise ignored — the
    /// counters still work locally, they just won't be scraped twice.
    fn new(pipeline_name: &str) -> Self {
        let records_read = IntCounter::with_opts(
            Opts::new(
                "conduit_pipeline_records_read_total",
                "records read from the buffer",
            )
            .const_label("pipeline", pipeline_name),
        )
        .expect("valid metric opts");
        let records_emitted = IntCounterVec::new(
            Opts::new(
                "conduit_pipeline_records_emitted_total",
                "records emitted per sink",
            )
            .const_label("pipeline", pipeline_name),
            &["sink_index"],
        )
        .expect("valid metric opts");
        let sink_failures = IntCounterVec::new(
            Opts::new("conduit_pipeline_sink_failures_total", "sink failures")
                .const_label("pipeline", pipeline_name),
            &["sink_index"],
        )
        .expect("valid metric opts");
        let processor_failures = IntCounter::with_opts(
            Opts::new(
                "conduit_pipeline_processor_failures_total",
                "processor failures",
            )
            .const_label("pipeline", pipeline_name),
        )
        .expect("valid metric opts");
        let records_dropped_on_stop = IntCounter::with_opts(
            Opts::new(
                "conduit_pipeline_records_dropped_on_stop_total",
                "records dropped on grace-exhaustion during stop",
            )
            .const_label("pipeline", pipeline_name),
        )
        .expect("valid metric opts");

        register_or_warn(&records_read, "conduit_pipeline_records_read_total");
        register_or_warn(&records_emitted, "conduit_pipeline_records_emitted_total");
        register_or_warn(&sink_failures, "conduit_pipeline_sink_failures_total");
        register_or_warn(&processor_failures, "conduit_pipeline_processor_failures_total");
        register_or_warn(
            &records_dropped_on_stop,
            "conduit_pipeline_records_dropped_on_stop_total",
        );

        Self {
            records_read,
            records_emitted,
            sink_failures,
            processor_failures,
            records_dropped_on_stop,
        }
    }
}

fn register_or_warn<C: prometheus::core::Collector + Clone + 'static>(collector: &C, name: &str) {
    if let Err(err) = prometheus::register(Box::new(collector.clone())) {
        tracing::warn!(metric = name, error = %err, "failed to register metric with the default registry");
    }
}

/// A running (or stopped) pipeline instance.
pub struct Pipeline {
    name: String,
    read_batch_delay: Duration,
    source: Arc<dyn Source>,
    buffer: Arc<dyn Buffer>,
    stages: Arc<Vec<crate::registry::ProcessorStage>>,
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    workers: u32,

    state: Arc<parking_lot::Mutex<PipelineState>>,
    cancellation: CancellationToken,
    metrics: Arc<Metrics>,
    dropped_on_stop: Arc<AtomicU64>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    stopped_once: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn from_built(built: BuiltPipeline) -> Self {
        let metrics = Arc::new(Metrics::new(&built.name));
        Self {
            name: built.name,
            read_batch_delay: built.read_batch_delay,
            source: built.source,
            buffer: built.buffer,
            stages: Arc::new(built.stages),
            sinks: Arc::new(built.sinks),
            workers: built.workers,
            metrics,
            state: Arc::new(parking_lot::Mutex::new(PipelineState::Built)),
            cancellation: CancellationToken::default(),
            dropped_on_stop: Arc::new(AtomicU64::new(0)),
            handles: parking_lot::Mutex::new(Vec::new()),
            stopped_once: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Records dropped on grace-exhaustion during `stop()`.
    pub fn dropped_on_stop(&self) -> u64 {
        self.dropped_on_stop.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock() = state;
        tracing::info!(pipeline = %self.name, ?state, "pipeline lifecycle transition");
    }

    /// Starts the source task and the `workers` worker tasks.
    pub async fn start(&self) {
        self.set_state(PipelineState::Starting);

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let source = self.source.clone();
        let buffer = self.buffer.clone();
        let cancellation = self.cancellation.clone();
        let pipeline_name = self.name.clone();

        let mut handles = Vec::new();

        let source_span = tracing::info_span!("source", pipeline = %pipeline_name);
        handles.push(tokio::spawn(
            async move {
                let writer: Arc<dyn conduit_domain::BufferWriter> = buffer.clone() as Arc<dyn conduit_domain::BufferWriter>;
                if let Err(err) = source.start(writer, stop_rx).await {
                    tracing::error!(error = %err, "source task exited with error");
                }
            }
            .instrument(source_span),
        ));

        self.handles.lock().push(tokio::spawn({
            let cancellation = cancellation.clone();
            async move {
                cancellation.cancelled().await;
                let _ = stop_tx.send(true);
            }
        }));

        for worker_index in 0..self.workers as usize {
            let buffer = self.buffer.clone();
            let stages = self.stages.clone();
            let sinks = self.sinks.clone();
            let cancellation = self.cancellation.clone();
            let metrics = self.metrics.clone();
            let read_batch_delay = self.read_batch_delay;
            let pipeline_name = self.name.clone();

            let worker_span =
                tracing::info_span!("worker", pipeline = %pipeline_name, worker_index);
            handles.push(tokio::spawn(
                worker_loop(
                    worker_index,
                    buffer,
                    stages,
                    sinks,
                    cancellation,
                    metrics,
                    read_batch_delay,
                )
                .instrument(worker_span),
            ));
        }

        self.handles.lock().extend(handles);
        self.set_state(PipelineState::Running);
    }

    /// Idempotent graceful stop: signals the source to cease producing, then
    /// gives the already-spawned worker tasks up to `grace_deadline` to keep
    /// draining the buffer through the normal stage+sink pipeline. Only
    /// handles still running once the deadline passes are force-aborted; the
    /// true post-deadline remainder left in the buffer is what gets dropped
    /// and counted. A second call observes the already-cancelled token and
    /// returns the same terminal state without re-running teardown.
    pub async fn stop(&self, grace_deadline: Duration) -> PipelineState {
        if self.stopped_once.swap(true, Ordering::AcqRel) {
            return self.state();
        }

        self.set_state(PipelineState::Stopping);
        self.cancellation.cancel();
        let _ = self.source.stop().await;

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + grace_deadline;
        let mut unfinished = Vec::new();
        for mut handle in handles {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                unfinished.push(handle);
                continue;
            }
            tokio::select! {
                _ = &mut handle => {}
                _ = tokio::time::sleep(deadline - now) => unfinished.push(handle),
            }
        }
        for handle in &unfinished {
            handle.abort();
        }

        self.buffer.close().await;

        // Every task that could still read the buffer has either finished
        // or been aborted; whatever's left never made it through in time.
        loop {
            match self.buffer.read(Duration::from_millis(0)).await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => {
                    self.dropped_on_stop
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                }
                Err(_) => break,
            }
        }

        let dropped = self.dropped_on_stop.load(Ordering::Relaxed);
        if dropped > 0 {
            self.metrics.records_dropped_on_stop.inc_by(dropped);
            tracing::warn!(pipeline = %self.name, dropped, "records dropped on grace-exhaustion");
        }

        self.set_state(PipelineState::Stopped);
        self.state()
    }

    pub fn mark_failed(&self, err: &ConduitError) {
        tracing::error!(pipeline = %self.name, error = %err, "pipeline failed");
        self.set_state(PipelineState::Failed);
    }
}

async fn worker_loop(
    worker_index: usize,
    buffer: Arc<dyn Buffer>,
    stages: Arc<Vec<crate::registry::ProcessorStage>>,
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    cancellation: CancellationToken,
    metrics: Arc<Metrics>,
    read_batch_delay: Duration,
) {
    loop {
        let batch = match buffer.read(read_batch_delay).await {
            Ok(batch) => batch,
            Err(_closed) => return,
        };

        if batch.is_empty() {
            if cancellation.is_cancelled() {
                return;
            }
            continue;
        }

        metrics.records_read.inc_by(batch.len() as u64);

        let mut current = batch.clone();
        let mut stage_failed = false;
        for stage in stages.iter() {
            let processor = stage.instance_for(worker_index);
            match processor.execute(current).await {
                Ok(next) => current = next,
                Err(err) => {
                    metrics.processor_failures.inc();
                    tracing::warn!(error = %err, "processor stage failed, dropping batch");
                    stage_failed = true;
                    break;
                }
            }
        }
        if stage_failed {
            let _ = buffer.commit(&batch).await;
            continue;
        }

        for (sink_index, sink) in sinks.iter().enumerate() {
            if let Err(err) = sink.output(current.clone()).await {
                metrics
                    .sink_failures
                    .with_label_values(&[&sink_index.to_string()])
                    .inc();
                tracing::warn!(error = %err, sink_index, "sink failed, continuing with remaining sinks");
            } else {
                metrics
                    .records_emitted
                    .with_label_values(&[&sink_index.to_string()])
                    .inc_by(current.len() as u64);
            }
        }

        let _ = buffer.commit(&batch).await;
    }
}
