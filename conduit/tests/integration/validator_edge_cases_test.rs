//! Validator behavior on documents parsed from YAML text, covering the
//! error paths the unit tests (programmatic `PipelineSpec`s) don't reach.

use conduit::topology::document::parse;
use conduit::{validate, TopologyError};

#[test]
fn duplicate_pipeline_names_are_rejected_at_the_yaml_layer() {
    let text = "A:\n  source:\n    file: {}\n  sink:\n    - stdout: {}\nA:\n  source:\n    file: {}\n  sink:\n    - stdout: {}\n";
    let err = parse(text).unwrap_err();
    assert!(matches!(err, TopologyError::DuplicateKey(_)));
}

#[test]
fn three_node_cycle_through_pipeline_links_is_rejected() {
    let text = r#"
A:
  source:
    file: {}
  sink:
    - pipeline: { name: "B" }

B:
  source:
    pipeline: { name: "A" }
  sink:
    - pipeline: { name: "C" }

C:
  source:
    pipeline: { name: "B" }
  sink:
    - pipeline: { name: "A" }
"#;
    let topology = parse(text).unwrap();
    let err = validate(&topology).unwrap_err();
    match err {
        TopologyError::Cycle(names) => assert_eq!(names.len(), 4), // A -> B -> C -> A
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[test]
fn reference_to_an_undeclared_pipeline_is_rejected() {
    let text = r#"
A:
  source:
    pipeline: { name: "does-not-exist" }
  sink:
    - stdout: {}
"#;
    let topology = parse(text).unwrap();
    let err = validate(&topology).unwrap_err();
    assert!(matches!(err, TopologyError::UnknownReference { .. }));
}
