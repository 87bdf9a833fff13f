// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Reference [`Sink`] adapters: stdout and an append-only file, each
//! rendering one JSON line per record.

use std::path::PathBuf;

use async_trait::async_trait;
use conduit_domain::{Batch, ConduitError, Sink};
use tokio::io::AsyncWriteExt;

pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn output(&self, batch: Batch) -> Result<(), ConduitError> {
        let mut stdout = tokio::io::stdout();
        for record in &batch {
            let line = serde_json::to_string(record)?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn output(&self, batch: Batch) -> Result<(), ConduitError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        for record in &batch {
            let line = serde_json::to_string(record)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_sink_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let sink = FileSink::new(&path);

        sink.output(vec![conduit_domain::Record::new("evt", json!({"a": 1}))])
            .await
            .unwrap();
        sink.output(vec![conduit_domain::Record::new("evt", json!({"a": 2}))])
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
