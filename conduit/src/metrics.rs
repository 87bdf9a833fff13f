// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Endpoint
//!
//! A lightweight HTTP server exposing the process's `prometheus` default
//! registry (the same registry every [`crate::runtime::Pipeline`] registers
//! its per-pipeline counters into) at `GET /metrics`, plus `GET /health` for
//! load-balancer probes.

use std::net::SocketAddr;

use prometheus::{Encoder, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves the process's default Prometheus registry over HTTP.
pub struct MetricsEndpoint {
    addr: SocketAddr,
}

impl MetricsEndpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Binds `addr` and serves `/metrics` and `/health` until cancelled.
    /// Runs indefinitely; the caller spawns it as a background task and
    /// aborts it as part of process shutdown.
    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "metrics endpoint listening on /metrics");

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    tokio::spawn(async move {
                        if let Err(err) = handle_request(&mut stream).await {
                            tracing::warn!(error = %err, "error handling metrics request");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "error accepting metrics connection");
                }
            }
        }
    }
}

fn render_metrics() -> Result<String, prometheus::Error> {
    let metric_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn handle_request(
    stream: &mut tokio::net::TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = [0; 1024];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    if request.starts_with("GET /metrics") {
        match render_metrics() {
            Ok(text) => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                    text.len(),
                    text
                );
                stream.write_all(response.as_bytes()).await?;
            }
            Err(e) => {
                let body = format!("error generating metrics: {e}");
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
        }
    } else if request.starts_with("GET /health") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK")
            .await?;
    } else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nNot Found")
            .await?;
    }

    stream.flush().await?;
    Ok(())
}
