// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The pipeline builder (C6): walks the validated topology in dependency
//! order, constructs plugin instances via the factory (C1), wires
//! connectors (C4), applies the peer-forwarding decorator (C5), and yields
//! runnable pipelines. Build failures unwind the failed pipeline's entire
//! connected component in the reference graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use conduit_domain::{Buffer, ConduitError, PluginLoadError, PluginSpec, Sink, Source, TopologySpec};

use crate::connector::{PipelineConnector, DEFAULT_CONNECTOR_CAPACITY};
use crate::decorator::{PeerForwarder, PeerForwardingDecorator, RetryPolicy};
use crate::registry::{PluginFactory, ProcessorStage};
use crate::topology::validator::{reference_edges, ValidatedTopology};

/// A fully assembled, not-yet-started pipeline.
pub struct BuiltPipeline {
    pub name: String,
    pub workers: u32,
    pub read_batch_delay: Duration,
    pub source: Arc<dyn Source>,
    pub buffer: Arc<dyn Buffer>,
    pub stages: Vec<ProcessorStage>,
    pub sinks: Vec<Arc<dyn Sink>>,
}

/// Result of a full build pass: the runnable pipelines plus a record of
/// every pipeline excluded because it, or something it is connected to via
/// the reference graph, failed to build.
pub struct BuildReport {
    pub runnable: HashMap<String, BuiltPipeline>,
    pub failures: HashMap<String, ConduitError>,
}

pub struct PipelineBuilder<'a> {
    topology: &'a TopologySpec,
    factory: &'a PluginFactory,
    peer_forwarder: Arc<dyn PeerForwarder>,
    retry_policy: RetryPolicy,
    default_buffer_capacity: usize,
    connector_capacity: usize,

    connectors: HashMap<String, Arc<PipelineConnector>>,
    runnable: HashMap<String, BuiltPipeline>,
    failed: HashSet<String>,
    failures: HashMap<String, ConduitError>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        topology: &'a TopologySpec,
        factory: &'a PluginFactory,
        peer_forwarder: Arc<dyn PeerForwarder>,
        retry_policy: RetryPolicy,
        default_buffer_capacity: usize,
    ) -> Self {
        Self {
            topology,
            factory,
            peer_forwarder,
            retry_policy,
            default_buffer_capacity,
            connector_capacity: DEFAULT_CONNECTOR_CAPACITY,
            connectors: HashMap::new(),
            runnable: HashMap::new(),
            failed: HashSet::new(),
            failures: HashMap::new(),
        }
    }

    /// Builds every pipeline named in `validated.build_order`.
    pub fn build(mut self, validated: &ValidatedTopology) -> BuildReport {
        for name in &validated.build_order {
            self.ensure_built(name);
        }
        BuildReport {
            runnable: self.runnable,
            failures: self.failures,
        }
    }

    /// Builds `name` unless it is already runnable or already failed
    /// (re-entrancy guard: each pipeline is built exactly once).
    fn ensure_built(&mut self, name: &str) {
        if self.runnable.contains_key(name) || self.failed.contains(name) {
            return;
        }
        if let Err(err) = self.build_one(name) {
            self.fail_and_unwind(name, err);
        }
    }

    fn connector_for(&mut self, downstream_name: &str) -> Arc<PipelineConnector> {
        self.connectors
            .entry(downstream_name.to_string())
            .or_insert_with(|| PipelineConnector::new(downstream_name, self.connector_capacity))
            .clone()
    }

    fn build_one(&mut self, name: &str) -> Result<(), ConduitError> {
        let spec = self
            .topology
            .get(name)
            .expect("builder only ever invoked with names present in the topology")
            .clone();

        // Step 1: resolve source.
        let source: Arc<dyn Source> = if spec.source_spec.is_pipeline_link() {
            let upstream = spec.source_spec.pipeline_link_target().ok_or_else(|| {
                ConduitError::PluginLoad(PluginLoadError::InvalidConfig {
                    name: spec.source_spec.name.clone(),
                    reason: "pipeline link missing 'name' attribute".into(),
                })
            })?;
            self.ensure_built(upstream);
            if self.failed.contains(upstream) {
                return Err(ConduitError::Internal(format!(
                    "upstream pipeline '{upstream}' failed to build"
                )));
            }
            let connector = self.connector_for(name);
            connector.set_upstream(upstream);
            connector
        } else {
            self.factory.load_source(&spec.source_spec)?
        };

        // Step 2: buffer.
        let buffer: Arc<dyn Buffer> = match &spec.buffer_spec {
            Some(buffer_spec) => self.factory.load_buffer(buffer_spec)?,
            None => Arc::new(crate::adapters::buffer::InMemoryBuffer::new(
                self.default_buffer_capacity,
            )),
        };

        // Steps 3-4: processor stages, decorated where peer-forwarding is required.
        let mut stages = Vec::with_capacity(spec.processor_specs.len());
        for processor_spec in &spec.processor_specs {
            let stage = self
                .factory
                .load_processor_stage(processor_spec, spec.workers)?;
            stages.push(self.decorate_if_required(stage, processor_spec));
        }

        // Step 5: sinks.
        let mut sinks = Vec::with_capacity(spec.sink_specs.len());
        for sink_spec in &spec.sink_specs {
            let sink: Arc<dyn Sink> = if sink_spec.is_pipeline_link() {
                let downstream = sink_spec.pipeline_link_target().ok_or_else(|| {
                    ConduitError::PluginLoad(PluginLoadError::InvalidConfig {
                        name: sink_spec.name.clone(),
                        reason: "pipeline link missing 'name' attribute".into(),
                    })
                })?;
                let connector = self.connector_for(downstream);
                connector.set_upstream(name);
                connector
            } else {
                self.factory.load_sink(sink_spec)?
            };
            sinks.push(sink);
        }

        // Step 6: assemble.
        self.runnable.insert(
            name.to_string(),
            BuiltPipeline {
                name: name.to_string(),
                workers: spec.workers,
                read_batch_delay: spec.read_batch_delay,
                source,
                buffer,
                stages,
                sinks,
            },
        );
        Ok(())
    }

    fn decorate_if_required(
        &self,
        stage: ProcessorStage,
        processor_spec: &PluginSpec,
    ) -> ProcessorStage {
        let capabilities = stage.capabilities();
        if !capabilities.requires_peer_forwarding {
            return stage;
        }
        let wrap = |inner: Arc<dyn conduit_domain::Processor>| {
            Arc::new(PeerForwardingDecorator::new(
                inner,
                self.peer_forwarder.clone(),
                capabilities.peer_forward_key_fields.clone(),
                self.retry_policy.clone(),
                processor_spec.name.clone(),
            )) as Arc<dyn conduit_domain::Processor>
        };
        match stage {
            ProcessorStage::Shared(inner) => ProcessorStage::Shared(wrap(inner)),
            ProcessorStage::PerWorker(instances) => {
                ProcessorStage::PerWorker(instances.into_iter().map(wrap).collect())
            }
        }
    }

    /// Removes `name` and every pipeline transitively connected to it in the
    /// reference graph — both source-connected predecessors and
    /// sink-connected successors — from the runnable set.
    fn fail_and_unwind(&mut self, name: &str, err: ConduitError) {
        let edges = reference_edges(self.topology);
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &edges {
            adjacency
                .entry(edge.upstream.as_str())
                .or_default()
                .push(edge.downstream.as_str());
            adjacency
                .entry(edge.downstream.as_str())
                .or_default()
                .push(edge.upstream.as_str());
        }

        let mut component = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !component.insert(current.clone()) {
                continue;
            }
            if let Some(neighbors) = adjacency.get(current.as_str()) {
                for neighbor in neighbors {
                    if !component.contains(*neighbor) {
                        stack.push(neighbor.to_string());
                    }
                }
            }
        }

        for pipeline_name in &component {
            self.runnable.remove(pipeline_name);
            self.failed.insert(pipeline_name.clone());
        }
        self.failures.insert(name.to_string(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use crate::topology::validator::validate;
    use async_trait::async_trait;
    use conduit_domain::{Batch, PipelineSpec, ProcessorCapabilities};
    use std::time::Duration as StdDuration;

    struct NoopSource;
    #[async_trait]
    impl Source for NoopSource {
        async fn start(
            &self,
            _target: Arc<dyn conduit_domain::BufferWriter>,
            _stop_signal: tokio::sync::watch::Receiver<bool>,
        ) -> Result<(), ConduitError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ConduitError> {
            Ok(())
        }
    }

    struct NoopSink;
    #[async_trait]
    impl Sink for NoopSink {
        async fn output(&self, _batch: Batch) -> Result<(), ConduitError> {
            Ok(())
        }
    }

    fn test_factory() -> PluginFactory {
        let mut registry = PluginRegistry::new();
        registry.register_source("noop-source", |_spec| Ok(Arc::new(NoopSource) as Arc<dyn Source>));
        registry.register_sink("noop-sink", |_spec| Ok(Arc::new(NoopSink) as Arc<dyn Sink>));
        PluginFactory::new(registry)
    }

    fn pipeline_with(
        name: &str,
        source_link: Option<&str>,
        sink_link: Option<&str>,
        processor_specs: Vec<PluginSpec>,
    ) -> PipelineSpec {
        let source_spec = match source_link {
            Some(target) => {
                PluginSpec::new("pipeline").with_attribute("name", serde_json::json!(target))
            }
            None => PluginSpec::new("noop-source"),
        };
        let sink_spec = match sink_link {
            Some(target) => {
                PluginSpec::new("pipeline").with_attribute("name", serde_json::json!(target))
            }
            None => PluginSpec::new("noop-sink"),
        };
        PipelineSpec {
            name: name.to_string(),
            workers: 1,
            read_batch_delay: StdDuration::from_secs(1),
            source_spec,
            buffer_spec: None,
            processor_specs,
            sink_specs: vec![sink_spec],
        }
    }

    fn peer_forwarder() -> Arc<dyn PeerForwarder> {
        Arc::new(crate::decorator::StaticPeerForwarder::new(
            "local",
            vec!["local".to_string()],
            crate::decorator::StaticPeerForwarder::shared_inboxes(),
        ))
    }

    #[test]
    fn s1_linear_link_produces_one_shared_connector() {
        let mut topology = TopologySpec::new();
        topology.push(pipeline_with("A", None, Some("B"), vec![]));
        topology.push(pipeline_with("B", Some("A"), None, vec![]));
        let validated = validate(&topology).unwrap();

        let factory = test_factory();
        let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
        let report = builder.build(&validated);

        assert_eq!(report.runnable.len(), 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn s3_build_failure_unwinds_connected_predecessors_and_successors() {
        let mut topology = TopologySpec::new();
        topology.push(pipeline_with("A", None, Some("B"), vec![]));
        topology.push(pipeline_with(
            "B",
            Some("A"),
            Some("C"),
            vec![PluginSpec::new("unknown-processor")],
        ));
        topology.push(pipeline_with("C", Some("B"), None, vec![]));
        let validated = validate(&topology).unwrap();

        let factory = test_factory();
        let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
        let report = builder.build(&validated);

        assert!(report.runnable.is_empty());
        assert!(report.failures.contains_key("B"));
    }

    #[test]
    fn single_thread_processor_stage_gets_worker_count_instances() {
        let mut registry = PluginRegistry::new();
        registry.register_source("noop-source", |_spec| Ok(Arc::new(NoopSource) as Arc<dyn Source>));
        registry.register_sink("noop-sink", |_spec| Ok(Arc::new(NoopSink) as Arc<dyn Sink>));
        registry.register_processor(
            "single",
            ProcessorCapabilities {
                single_thread: true,
                ..Default::default()
            },
            |_spec| {
                struct P;
                #[async_trait]
                impl conduit_domain::Processor for P {
                    async fn execute(&self, batch: Batch) -> Result<Batch, ConduitError> {
                        Ok(batch)
                    }
                    fn capabilities(&self) -> ProcessorCapabilities {
                        ProcessorCapabilities {
                            single_thread: true,
                            ..Default::default()
                        }
                    }
                }
                Ok(Arc::new(P) as Arc<dyn conduit_domain::Processor>)
            },
        );
        let factory = PluginFactory::new(registry);

        let mut topology = TopologySpec::new();
        let mut spec = pipeline_with("A", None, None, vec![PluginSpec::new("single")]);
        spec.workers = 4;
        topology.push(spec);
        let validated = validate(&topology).unwrap();

        let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
        let report = builder.build(&validated);
        let built = &report.runnable["A"];
        match &built.stages[0] {
            ProcessorStage::PerWorker(instances) => assert_eq!(instances.len(), 4),
            ProcessorStage::Shared(_) => panic!("expected per-worker stage"),
        }
    }

    #[test]
    fn s4_pure_predecessor_unwind_on_tail_failure() {
        let mut topology = TopologySpec::new();
        topology.push(pipeline_with("A", None, Some("B"), vec![]));
        topology.push(pipeline_with("B", Some("A"), Some("C"), vec![]));
        topology.push(pipeline_with(
            "C",
            Some("B"),
            None,
            vec![PluginSpec::new("unknown-processor")],
        ));
        let validated = validate(&topology).unwrap();

        let factory = test_factory();
        let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
        let report = builder.build(&validated);

        // C (the tail) is the one that actually fails to build; A and B
        // build cleanly before the builder ever reaches C. The unwind still
        // has to remove them, since they're connected to C's failure through
        // the reference graph even though nothing downstream of A failed on
        // A's own account.
        assert!(report.runnable.is_empty());
        assert!(!report.runnable.contains_key("A"));
        assert!(!report.runnable.contains_key("B"));
        assert!(report.failures.contains_key("C"));
    }
}
