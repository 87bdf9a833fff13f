// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Reference [`Source`] adapters: a file tailer reading newline-delimited
//! records, and a channel-fed source for tests and programmatic callers.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_domain::{BufferWriter, ConduitError, Record, Source};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};

/// Reads newline-delimited records from a file, one [`Record`] per line.
/// A line that parses as JSON becomes the record's event payload verbatim;
/// anything else is wrapped as a JSON string.
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse_line(line: &str) -> Record {
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => Record::new("line", value),
            Err(_) => Record::new("line", serde_json::Value::String(line.to_string())),
        }
    }
}

#[async_trait]
impl Source for LineFileSource {
    async fn start(
        &self,
        target: Arc<dyn BufferWriter>,
        mut stop_signal: watch::Receiver<bool>,
    ) -> Result<(), ConduitError> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();

        loop {
            if *stop_signal.borrow() {
                return Ok(());
            }
            tokio::select! {
                next = lines.next_line() => {
                    match next? {
                        Some(line) if line.is_empty() => continue,
                        Some(line) => {
                            target
                                .write(Self::parse_line(&line))
                                .await
                                .map_err(|e| ConduitError::Internal(e.to_string()))?;
                        }
                        None => return Ok(()),
                    }
                }
                _ = stop_signal.changed() => continue,
            }
        }
    }

    async fn stop(&self) -> Result<(), ConduitError> {
        Ok(())
    }
}

/// A source fed by an in-process channel. Used by tests and by any
/// composition root that wants to hand records to the runtime
/// programmatically instead of reading them from external I/O.
pub struct ChannelSource {
    receiver: Mutex<mpsc::Receiver<Record>>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Record>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { receiver: Mutex::new(rx) })
    }
}

#[async_trait]
impl Source for ChannelSource {
    async fn start(
        &self,
        target: Arc<dyn BufferWriter>,
        mut stop_signal: watch::Receiver<bool>,
    ) -> Result<(), ConduitError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            if *stop_signal.borrow() {
                return Ok(());
            }
            tokio::select! {
                record = receiver.recv() => {
                    match record {
                        Some(record) => target
                            .write(record)
                            .await
                            .map_err(|e| ConduitError::Internal(e.to_string()))?,
                        None => return Ok(()),
                    }
                }
                _ = stop_signal.changed() => continue,
            }
        }
    }

    async fn stop(&self) -> Result<(), ConduitError> {
        Ok(())
    }
}
