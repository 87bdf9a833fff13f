//! Full run of a single pipeline built from a YAML topology document,
//! through the bundled file source/sink and uppercase processor.

use std::time::Duration;

use conduit::registry::{default_registry, PluginFactory};
use conduit::topology::document::parse;
use conduit::{validate, Pipeline, PipelineBuilder, PipelineState, RetryPolicy, StaticPeerForwarder};
use std::sync::Arc;
use tempfile::tempdir;

use crate::common::wait_for_lines;

fn peer_forwarder() -> Arc<dyn conduit::PeerForwarder> {
    Arc::new(StaticPeerForwarder::new(
        "local",
        vec!["local".to_string()],
        StaticPeerForwarder::shared_inboxes(),
    ))
}

#[tokio::test]
async fn uppercases_every_record_flowing_from_file_source_to_file_sink() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.log");
    let output_path = dir.path().join("out.log");

    std::fs::write(
        &input_path,
        concat!(
            "{\"name\": \"ada\"}\n",
            "{\"name\": \"grace\"}\n",
            "{\"name\": \"margaret\"}\n",
        ),
    )
    .unwrap();

    let document = format!(
        r#"
ingest:
  workers: 1
  source:
    file: {{ path: {input:?} }}
  processor:
    - uppercase: {{ field: "name" }}
  sink:
    - file: {{ path: {output:?} }}
"#,
        input = input_path.to_str().unwrap(),
        output = output_path.to_str().unwrap(),
    );

    let topology = parse(&document).unwrap();
    let validated = validate(&topology).unwrap();

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
    let mut report = builder.build(&validated);
    let built = report.runnable.remove("ingest").expect("pipeline should build");

    let pipeline = Pipeline::from_built(built);
    pipeline.start().await;

    let lines = wait_for_lines(&output_path, 3, Duration::from_secs(5)).await;
    assert_eq!(lines.len(), 3, "expected 3 output lines, got: {lines:?}");
    for line in &lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        let name = value["event"]["name"].as_str().unwrap();
        assert_eq!(name, name.to_uppercase());
    }

    let state = pipeline.stop(Duration::from_secs(2)).await;
    assert_eq!(state, PipelineState::Stopped);
}
