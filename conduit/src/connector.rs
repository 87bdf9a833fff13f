// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The pipeline connector (C4): a dual-role object that is simultaneously a
//! [`Sink`] in its upstream pipeline and a [`Source`] in its downstream
//! pipeline, passing records in-process.
//!
//! A connector is registered and looked up by its **downstream** pipeline's
//! name: a single named downstream pipeline may have at most one
//! `PipelineConnector` acting as its source.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_domain::{BufferError, BufferWriter, ConduitError, Record, Sink, Source};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, Semaphore};

/// Internal bounded FIFO carrying records from the connector's sink side to
/// its source side. Reuses the same backpressure contract as a real
/// `Buffer`: writers block (semaphore acquire) when the queue is at
/// capacity.
struct InternalQueue {
    records: Mutex<VecDeque<Record>>,
    permits: Semaphore,
    notify_readers: Notify,
    closed: AtomicBool,
}

impl InternalQueue {
    fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            permits: Semaphore::new(capacity),
            notify_readers: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn push(&self, record: Record) -> Result<(), BufferError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed);
        }
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BufferError::Closed)?;
        permit.forget();
        self.records.lock().push_back(record);
        self.notify_readers.notify_one();
        Ok(())
    }

    async fn pop_wait(&self, max_wait: Duration) -> VecDeque<Record> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            {
                let mut records = self.records.lock();
                if !records.is_empty() {
                    let drained = std::mem::take(&mut *records);
                    self.permits.add_permits(drained.len());
                    return drained;
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return VecDeque::new();
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return VecDeque::new();
            }
            tokio::select! {
                _ = self.notify_readers.notified() => {}
                _ = tokio::time::sleep(deadline - now) => return VecDeque::new(),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify_readers.notify_waiters();
    }
}

/// Default internal queue depth when the builder does not specify one
/// (mirrors the pipeline's own default buffer capacity).
pub const DEFAULT_CONNECTOR_CAPACITY: usize = 256;

pub struct PipelineConnector {
    downstream_name: String,
    upstream_name: RwLock<Option<String>>,
    queue: Arc<InternalQueue>,
}

impl PipelineConnector {
    pub fn new(downstream_name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            downstream_name: downstream_name.into(),
            upstream_name: RwLock::new(None),
            queue: Arc::new(InternalQueue::new(capacity)),
        })
    }

    pub fn downstream_name(&self) -> &str {
        &self.downstream_name
    }

    pub fn upstream_name(&self) -> Option<String> {
        self.upstream_name.read().clone()
    }

    /// Set at wiring time, once the upstream pipeline referencing this
    /// connector is known.
    pub fn set_upstream(&self, name: impl Into<String>) {
        *self.upstream_name.write() = Some(name.into());
    }
}

#[async_trait]
impl Sink for PipelineConnector {
    async fn output(&self, batch: Vec<Record>) -> Result<(), ConduitError> {
        for record in batch {
            self.queue
                .push(record)
                .await
                .map_err(|e| ConduitError::Sink(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Source for PipelineConnector {
    async fn start(
        &self,
        target: Arc<dyn BufferWriter>,
        mut stop_signal: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ConduitError> {
        loop {
            if *stop_signal.borrow() {
                break;
            }
            let drained = tokio::select! {
                batch = self.queue.pop_wait(Duration::from_millis(200)) => batch,
                _ = stop_signal.changed() => continue,
            };
            if !drained.is_empty() {
                target
                    .write_batch(drained.into_iter().collect())
                    .await
                    .map_err(|e| ConduitError::Internal(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConduitError> {
        self.queue.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_domain::Record as R;
    use serde_json::json;

    struct CollectingWriter {
        received: Mutex<Vec<R>>,
    }

    #[async_trait]
    impl BufferWriter for CollectingWriter {
        async fn write(&self, record: R) -> Result<(), BufferError> {
            self.received.lock().push(record);
            Ok(())
        }
        async fn write_batch(&self, batch: Vec<R>) -> Result<(), BufferError> {
            self.received.lock().extend(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_written_as_sink_are_observed_as_source() {
        let connector = PipelineConnector::new("downstream", 16);
        connector.set_upstream("upstream");

        let writer = Arc::new(CollectingWriter {
            received: Mutex::new(Vec::new()),
        });
        let (tx, rx) = tokio::sync::watch::channel(false);

        Sink::output(
            connector.as_ref(),
            vec![R::new("evt", json!({"k": 1}))],
        )
        .await
        .unwrap();

        let writer_clone = writer.clone();
        let connector_clone = connector.clone();
        let handle = tokio::spawn(async move {
            Source::start(connector_clone.as_ref(), writer_clone, rx)
                .await
                .unwrap();
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        let _ = handle.await;

        assert_eq!(writer.received.lock().len(), 1);
    }

    #[test]
    fn connector_is_registered_by_downstream_name() {
        let connector = PipelineConnector::new("B", DEFAULT_CONNECTOR_CAPACITY);
        assert_eq!(connector.downstream_name(), "B");
        assert_eq!(connector.upstream_name(), None);
        connector.set_upstream("A");
        assert_eq!(connector.upstream_name().as_deref(), Some("A"));
    }
}
