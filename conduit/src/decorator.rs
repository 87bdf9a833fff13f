// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The peer-forwarding decorator (C5): wraps a processor that declares
//! cross-node state affinity so every event lands on the cluster peer that
//! owns its key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_domain::{Batch, ConduitError, PeerForwardingError, Processor, ProcessorCapabilities, Record};
use rand::Rng;
use sha2::{Digest, Sha256};

pub type PeerId = String;

/// The RPC port the decorator consumes; the actual cross-node transport is
/// an external collaborator the core doesn't implement.
#[async_trait]
pub trait PeerForwarder: Send + Sync {
    async fn forward(&self, batch: Batch, peer: &PeerId) -> Result<(), PeerForwardingError>;

    /// Server-side pull: batches other peers have forwarded to this node.
    async fn receive(&self) -> Batch;

    /// Deterministic mapping from a key's hash to the peer that owns it.
    /// A missing peer at selection time folds into the timeout path:
    /// peer-absent is treated as an immediate timeout.
    fn owning_peer(&self, key_hash: u64) -> Option<PeerId>;

    fn local_peer(&self) -> &PeerId;
}

/// Retry policy for remote forwarding.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Full-jitter exponential backoff delay for the given zero-indexed
    /// attempt number.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(20));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::rng().random_range(0..=capped.max(1)) as u64;
        Duration::from_millis(jittered)
    }
}

/// A reference in-process/local-cluster implementation of [`PeerForwarder`],
/// suitable for tests and single/multi-process local clusters. A real
/// cluster transport is an external collaborator this crate doesn't
/// implement.
pub struct StaticPeerForwarder {
    local_peer: PeerId,
    peers: Vec<PeerId>,
    inboxes: Arc<parking_lot::Mutex<HashMap<PeerId, Vec<Record>>>>,
}

impl StaticPeerForwarder {
    pub fn new(
        local_peer: impl Into<String>,
        peers: Vec<PeerId>,
        inboxes: Arc<parking_lot::Mutex<HashMap<PeerId, Vec<Record>>>>,
    ) -> Self {
        Self {
            local_peer: local_peer.into(),
            peers,
            inboxes,
        }
    }

    pub fn shared_inboxes() -> Arc<parking_lot::Mutex<HashMap<PeerId, Vec<Record>>>> {
        Arc::new(parking_lot::Mutex::new(HashMap::new()))
    }
}

#[async_trait]
impl PeerForwarder for StaticPeerForwarder {
    async fn forward(&self, batch: Batch, peer: &PeerId) -> Result<(), PeerForwardingError> {
        self.inboxes
            .lock()
            .entry(peer.clone())
            .or_default()
            .extend(batch);
        Ok(())
    }

    async fn receive(&self) -> Batch {
        self.inboxes
            .lock()
            .get_mut(&self.local_peer)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn owning_peer(&self, key_hash: u64) -> Option<PeerId> {
        if self.peers.is_empty() {
            return None;
        }
        let idx = (key_hash as usize) % self.peers.len();
        self.peers.get(idx).cloned()
    }

    fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }
}

/// Hashes a record's configured key fields into a stable `u64` used for
/// peer selection. Deterministic for equal key values regardless of process.
pub fn key_hash(record: &Record, key_fields: &[String]) -> u64 {
    let mut hasher = Sha256::new();
    for field in key_fields {
        let value = record.field_str(field).unwrap_or_default();
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is >= 8 bytes"))
}

/// Wraps a stateful processor so that records are routed to the cluster
/// peer owning their key before the wrapped processor ever sees them.
pub struct PeerForwardingDecorator {
    inner: Arc<dyn Processor>,
    forwarder: Arc<dyn PeerForwarder>,
    key_fields: Vec<String>,
    retry_policy: RetryPolicy,
    /// The real plugin name that produced `inner`, not a hard-coded
    /// placeholder.
    plugin_name: String,
    dropped_records: AtomicU64,
}

impl PeerForwardingDecorator {
    pub fn new(
        inner: Arc<dyn Processor>,
        forwarder: Arc<dyn PeerForwarder>,
        key_fields: Vec<String>,
        retry_policy: RetryPolicy,
        plugin_name: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            forwarder,
            key_fields,
            retry_policy,
            plugin_name: plugin_name.into(),
            dropped_records: AtomicU64::new(0),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn dropped_records(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    /// Drives the retry/backoff loop for one destination. `peer: None` is
    /// the peer-absent case: there's no peer to call `forward` on, so every
    /// attempt fails with [`PeerForwardingError::PeerAbsent`] and the batch
    /// runs through the same backoff/exhaustion accounting as a real remote
    /// timeout.
    async fn forward_with_retry(&self, peer: Option<&PeerId>, batch: Batch) -> usize {
        let mut attempt = 0;
        let mut pending = batch;
        loop {
            let outcome = match peer {
                Some(p) => self.forwarder.forward(pending.clone(), p).await,
                None => {
                    let hash = pending
                        .first()
                        .map(|r| key_hash(r, &self.key_fields))
                        .unwrap_or(0);
                    Err(PeerForwardingError::PeerAbsent(hash))
                }
            };
            match outcome {
                Ok(()) => return 0,
                Err(_timeout_or_absent) => {
                    attempt += 1;
                    if attempt >= self.retry_policy.max_attempts {
                        let dropped = pending.len();
                        let exhausted = PeerForwardingError::RetriesExhausted {
                            attempts: attempt,
                            dropped,
                        };
                        self.dropped_records
                            .fetch_add(dropped as u64, Ordering::Relaxed);
                        tracing::warn!(
                            plugin = %self.plugin_name,
                            peer = ?peer,
                            %exhausted,
                            "peer-forwarding retries exhausted, dropping records"
                        );
                        return dropped;
                    }
                    tokio::time::sleep(self.retry_policy.backoff_delay(attempt)).await;
                }
            }
        }
    }
}

#[async_trait]
impl Processor for PeerForwardingDecorator {
    async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError> {
        // Partition preserving per-key arrival order: records sharing a key
        // stay in relative order within their partition.
        let mut local: Batch = Vec::new();
        // `None` groups records whose key hash has no owning peer right now;
        // they're forwarded through the same retry loop as a real peer, just
        // one that always reports itself absent.
        let mut remote: HashMap<Option<PeerId>, Batch> = HashMap::new();

        for record in batch {
            let hash = key_hash(&record, &self.key_fields);
            let owner = self.forwarder.owning_peer(hash);
            match owner {
                Some(peer) if peer == *self.forwarder.local_peer() => local.push(record),
                Some(peer) => remote.entry(Some(peer)).or_default().push(record),
                None => remote.entry(None).or_default().push(record),
            }
        }

        for (peer, peer_batch) in remote {
            self.forward_with_retry(peer.as_ref(), peer_batch).await;
        }

        let inbound = self.forwarder.receive().await;
        let mut owned = local;
        owned.extend(inbound);

        if owned.is_empty() {
            return Ok(Vec::new());
        }

        self.inner.execute(owned).await
    }

    fn capabilities(&self) -> ProcessorCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RecordingProcessor {
        seen: parking_lot::Mutex<Vec<Record>>,
    }

    #[async_trait]
    impl Processor for RecordingProcessor {
        async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError> {
            self.seen.lock().extend(batch.clone());
            Ok(batch)
        }
        fn capabilities(&self) -> ProcessorCapabilities {
            ProcessorCapabilities {
                requires_peer_forwarding: true,
                peer_forward_key_fields: vec!["k".into()],
                ..Default::default()
            }
        }
    }

    fn record_with_key(k: i64) -> Record {
        Record::new("evt", json!({"k": k.to_string()}))
    }

    #[tokio::test]
    async fn same_key_records_preserve_relative_order_locally() {
        let inboxes = StaticPeerForwarder::shared_inboxes();
        let forwarder = Arc::new(StaticPeerForwarder::new(
            "node-x",
            vec!["node-x".to_string()],
            inboxes,
        ));
        let inner = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator = PeerForwardingDecorator::new(
            inner.clone(),
            forwarder,
            vec!["k".into()],
            RetryPolicy::default(),
            "keyed-count",
        );

        let batch = vec![record_with_key(1), record_with_key(1), record_with_key(1)];
        decorator.execute(batch).await.unwrap();

        let seen = inner.seen.lock();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn two_node_cluster_routes_records_to_owning_peer() {
        let inboxes = StaticPeerForwarder::shared_inboxes();
        let peers = vec!["node-x".to_string(), "node-y".to_string()];

        let forwarder_x = Arc::new(StaticPeerForwarder::new(
            "node-x",
            peers.clone(),
            inboxes.clone(),
        ));
        let forwarder_y = Arc::new(StaticPeerForwarder::new("node-y", peers, inboxes));

        // Scan for two key values that hash to distinct peers so the test
        // doesn't depend on luck with any single fixed pair.
        let (key_a, key_b, owner_1, owner_2) = (0..100)
            .find_map(|k| {
                let o1 = forwarder_x.owning_peer(key_hash(&record_with_key(k), &["k".into()]));
                let o2 = forwarder_x.owning_peer(key_hash(&record_with_key(k + 1), &["k".into()]));
                if o1 != o2 {
                    Some((k, k + 1, o1, o2))
                } else {
                    None
                }
            })
            .expect("at least one adjacent key pair hashes to distinct peers within 100 tries");

        let inner_x = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator_x = PeerForwardingDecorator::new(
            inner_x.clone(),
            forwarder_x,
            vec!["k".into()],
            RetryPolicy::default(),
            "keyed-count",
        );

        let batch = vec![
            record_with_key(key_a),
            record_with_key(key_b),
            record_with_key(key_a),
        ];
        decorator_x.execute(batch).await.unwrap();

        let inner_y = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator_y = PeerForwardingDecorator::new(
            inner_y.clone(),
            forwarder_y,
            vec!["k".into()],
            RetryPolicy::default(),
            "keyed-count",
        );
        decorator_y.execute(Vec::new()).await.unwrap();

        if owner_1 == Some("node-x".to_string()) {
            assert_eq!(inner_x.seen.lock().len(), 2);
            assert_eq!(inner_y.seen.lock().len(), 1);
        } else {
            assert_eq!(inner_x.seen.lock().len(), 1);
            assert_eq!(inner_y.seen.lock().len(), 2);
        }
    }

    /// A [`PeerForwarder`] that reports itself as the owner of every key
    /// (so records always route remote) and fails `forward` with
    /// `PeerForwardingError::Timeout` for the first `fail_times` calls
    /// before succeeding.
    struct FlakyForwarder {
        local: PeerId,
        peers: Vec<PeerId>,
        fail_times: usize,
        attempts: std::sync::atomic::AtomicUsize,
        forwarded: parking_lot::Mutex<Vec<Batch>>,
    }

    #[async_trait]
    impl PeerForwarder for FlakyForwarder {
        async fn forward(&self, batch: Batch, peer: &PeerId) -> Result<(), PeerForwardingError> {
            let n = self.attempts.fetch_add(1, Ordering::Relaxed);
            if n < self.fail_times {
                return Err(PeerForwardingError::Timeout {
                    peer_id: peer.clone(),
                });
            }
            self.forwarded.lock().push(batch);
            Ok(())
        }

        async fn receive(&self) -> Batch {
            Vec::new()
        }

        fn owning_peer(&self, key_hash: u64) -> Option<PeerId> {
            if self.peers.is_empty() {
                return None;
            }
            let idx = (key_hash as usize) % self.peers.len();
            self.peers.get(idx).cloned()
        }

        fn local_peer(&self) -> &PeerId {
            &self.local
        }
    }

    fn remote_key(forwarder: &FlakyForwarder) -> i64 {
        (0..100)
            .find(|&k| {
                forwarder.owning_peer(key_hash(&record_with_key(k), &["k".into()]))
                    == Some("node-y".to_string())
            })
            .expect("at least one key within 100 tries routes to node-y")
    }

    fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn remote_forward_retries_until_success_within_max_attempts() {
        let forwarder = Arc::new(FlakyForwarder {
            local: "node-x".to_string(),
            peers: vec!["node-x".to_string(), "node-y".to_string()],
            fail_times: 2,
            attempts: std::sync::atomic::AtomicUsize::new(0),
            forwarded: parking_lot::Mutex::new(Vec::new()),
        });
        let key = remote_key(&forwarder);
        let inner = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator = PeerForwardingDecorator::new(
            inner,
            forwarder.clone(),
            vec!["k".into()],
            fast_retry_policy(5),
            "keyed-count",
        );

        decorator.execute(vec![record_with_key(key)]).await.unwrap();

        assert_eq!(forwarder.attempts.load(Ordering::Relaxed), 3);
        assert_eq!(decorator.dropped_records(), 0);
        assert_eq!(forwarder.forwarded.lock().len(), 1);
    }

    #[tokio::test]
    async fn remote_forward_exhausting_retries_drops_and_counts_the_batch() {
        let forwarder = Arc::new(FlakyForwarder {
            local: "node-x".to_string(),
            peers: vec!["node-x".to_string(), "node-y".to_string()],
            fail_times: usize::MAX,
            attempts: std::sync::atomic::AtomicUsize::new(0),
            forwarded: parking_lot::Mutex::new(Vec::new()),
        });
        let key = remote_key(&forwarder);
        let inner = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator = PeerForwardingDecorator::new(
            inner,
            forwarder.clone(),
            vec!["k".into()],
            fast_retry_policy(3),
            "keyed-count",
        );

        decorator.execute(vec![record_with_key(key)]).await.unwrap();

        assert_eq!(forwarder.attempts.load(Ordering::Relaxed), 3);
        assert_eq!(decorator.dropped_records(), 1);
        assert!(forwarder.forwarded.lock().is_empty());
    }

    #[tokio::test]
    async fn peer_absent_at_selection_time_is_retried_and_dropped_like_a_timeout() {
        let forwarder = Arc::new(StaticPeerForwarder::new(
            "node-x",
            Vec::new(),
            StaticPeerForwarder::shared_inboxes(),
        ));
        let inner = Arc::new(RecordingProcessor {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let decorator = PeerForwardingDecorator::new(
            inner,
            forwarder,
            vec!["k".into()],
            fast_retry_policy(2),
            "keyed-count",
        );

        decorator
            .execute(vec![record_with_key(1), record_with_key(2)])
            .await
            .unwrap();

        assert_eq!(decorator.dropped_records(), 2);
    }
}
