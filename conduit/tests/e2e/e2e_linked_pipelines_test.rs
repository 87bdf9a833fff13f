//! Full run of two pipelines joined by a [`PipelineConnector`]: `ingest`
//! reads from a file and forwards into `archive` purely through the
//! in-process connector, with no intermediate file or socket.

use std::sync::Arc;
use std::time::Duration;

use conduit::registry::{default_registry, PluginFactory};
use conduit::topology::document::parse;
use conduit::{validate, Pipeline, PipelineBuilder, PipelineState, RetryPolicy, StaticPeerForwarder};
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
async fn records_flow_from_ingest_through_the_connector_into_archive() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.log");
    let output_path = dir.path().join("out.log");

    std::fs::write(&input_path, "{\"id\": 1}\n{\"id\": 2}\n").unwrap();

    let document = format!(
        r#"
ingest:
  source:
    file: {{ path: {input:?} }}
  sink:
    - pipeline: {{ name: "archive" }}

archive:
  source:
    pipeline: {{ name: "ingest" }}
  sink:
    - file: {{ path: {output:?} }}
"#,
        input = input_path.to_str().unwrap(),
        output = output_path.to_str().unwrap(),
    );

    let topology = parse(&document).unwrap();
    let validated = validate(&topology).unwrap();
    assert_eq!(validated.build_order, vec!["ingest".to_string(), "archive".to_string()]);

    let registry = default_registry();
    let factory = PluginFactory::new(registry);
    let builder = PipelineBuilder::new(&topology, &factory, peer_forwarder(), RetryPolicy::default(), 64);
    let mut report = builder.build(&validated);
    assert!(report.failures.is_empty(), "unexpected build failures: {:?}", report.failures);

    let archive = Pipeline::from_built(report.runnable.remove("archive").unwrap());
    let ingest = Pipeline::from_built(report.runnable.remove("ingest").unwrap());

    // Start the downstream pipeline first so the connector has a reader
    // ready before ingest's records arrive.
    archive.start().await;
    ingest.start().await;

    let lines = wait_for_lines(&output_path, 2, Duration::from_secs(5)).await;
    assert_eq!(lines.len(), 2, "expected 2 forwarded records, got: {lines:?}");

    let ids: Vec<i64> = lines
        .iter()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["event"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    assert_eq!(ingest.stop(Duration::from_secs(2)).await, PipelineState::Stopped);
    assert_eq!(archive.stop(Duration::from_secs(2)).await, PipelineState::Stopped);
}
