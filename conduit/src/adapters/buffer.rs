// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The default in-memory [`Buffer`]: used whenever a pipeline spec omits
//! `bufferSpec`. Capacity bounds *outstanding* records — those published by
//! the source but not yet committed by a worker — giving true end-to-end
//! backpressure rather than just bounding the queue depth.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conduit_domain::{Batch, Buffer, BufferError, BufferWriter, Record};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

pub struct InMemoryBuffer {
    records: Mutex<VecDeque<Record>>,
    permits: Semaphore,
    notify_readers: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl InMemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            permits: Semaphore::new(capacity),
            notify_readers: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl BufferWriter for InMemoryBuffer {
    async fn write(&self, record: Record) -> Result<(), BufferError> {
        self.write_batch(vec![record]).await
    }

    async fn write_batch(&self, batch: Batch) -> Result<(), BufferError> {
        if batch.is_empty() {
            return Ok(());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed);
        }
        let permit = self
            .permits
            .acquire_many(batch.len() as u32)
            .await
            .map_err(|_| BufferError::Closed)?;
        permit.forget();
        self.records.lock().extend(batch);
        self.notify_readers.notify_one();
        Ok(())
    }
}

#[async_trait]
impl Buffer for InMemoryBuffer {
    async fn read(&self, max_wait: Duration) -> Result<Batch, BufferError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            {
                let mut records = self.records.lock();
                if !records.is_empty() {
                    return Ok(std::mem::take(&mut *records).into_iter().collect());
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return Ok(Vec::new());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = self.notify_readers.notified() => {}
                _ = tokio::time::sleep(deadline - now) => return Ok(Vec::new()),
            }
        }
    }

    async fn commit(&self, batch: &Batch) -> Result<(), BufferError> {
        if !batch.is_empty() {
            self.permits.add_permits(batch.len());
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify_readers.notify_waiters();
    }
}
