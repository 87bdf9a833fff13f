//! Builds pipelines out of the bundled reference adapters via
//! [`default_registry`], exercising the registry/factory/builder seam end to
//! end instead of the builder unit tests' hand-rolled noop plugins.

use std::sync::Arc;

use conduit::registry::{default_registry, PluginFactory, ProcessorStage};
use conduit::topology::document::parse;
use conduit::{validate, PipelineBuilder, RetryPolicy, StaticPeerForwarder};

fn peer_forwarder() -> Arc<dyn conduit::PeerForwarder> {
    Arc::new(StaticPeerForwarder::new(
        "local",
        vec!["local".to_string()],
        StaticPeerForwarder::shared_inboxes(),
    ))
}

#[test]
fn builds_a_pipeline_out_of_bundled_file_and_processor_adapters() {
    let text = r#"
ingest:
  workers: 3
  source:
    file: { path: "/tmp/conduit-builder-test-in.log" }
  processor:
    - uppercase: { field: "name" }
  sink:
    - file: { path: "/tmp/conduit-builder-test-out.log" }
"#;
    let topology = parse(text).unwrap();
    let validated = validate(&topology).unwrap();

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
    let report = builder.build(&validated);

    assert!(report.failures.is_empty(), "unexpected build failures: {:?}", report.failures);
    let built = &report.runnable["ingest"];
    assert_eq!(built.sinks.len(), 1);

    // `uppercase` declares single-thread affinity, so it gets one instance
    // per worker rather than a single shared instance.
    match &built.stages[0] {
        ProcessorStage::PerWorker(instances) => assert_eq!(instances.len(), 3),
        ProcessorStage::Shared(_) => panic!("expected a per-worker stage for uppercase"),
    }
}

#[test]
fn unknown_plugin_name_fails_the_build_without_panicking() {
    let text = r#"
ingest:
  source:
    file: { path: "/tmp/in.log" }
  processor:
    - does-not-exist: {}
  sink:
    - stdout: {}
"#;
    let topology = parse(text).unwrap();
    let validated = validate(&topology).unwrap();

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
    let report = builder.build(&validated);

    assert!(report.runnable.is_empty());
    assert!(report.failures.contains_key("ingest"));
}

#[test]
fn keyed_count_processor_is_wrapped_with_the_peer_forwarding_decorator() {
    let text = r#"
ingest:
  source:
    file: { path: "/tmp/in.log" }
  processor:
    - keyed-count: { key: "user" }
  sink:
    - stdout: {}
"#;
    let topology = parse(text).unwrap();
    let validated = validate(&topology).unwrap();

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
    let report = builder.build(&validated);

    let built = &report.runnable["ingest"];
    match &built.stages[0] {
        ProcessorStage::Shared(processor) => {
            assert!(processor.capabilities().requires_peer_forwarding);
        }
        ProcessorStage::PerWorker(_) => panic!("keyed-count is shared, not per-worker"),
    }
}
