//! Parses a multi-pipeline YAML document from disk and validates it,
//! exercising the document loader and validator together rather than
//! against hand-built `PipelineSpec`s.

use conduit::topology::document::parse;
use conduit::validate;

#[test]
fn parses_and_validates_a_three_pipeline_document() {
    let text = r#"
ingest:
  workers: 2
  delay: "250ms"
  source:
    file: { path: "/tmp/conduit-test-in.log" }
  processor:
    - uppercase: { field: "name" }
  sink:
    - pipeline: { name: "count" }

count:
  source:
    pipeline: { name: "ingest" }
  processor:
    - keyed-count: { key: "name" }
  sink:
    - pipeline: { name: "archive" }

archive:
  source:
    pipeline: { name: "count" }
  sink:
    - file: { path: "/tmp/conduit-test-out.log" }
"#;

    let topology = parse(text).expect("document should parse");
    assert_eq!(topology.len(), 3);

    let validated = validate(&topology).expect("topology should validate");
    assert_eq!(
        validated.build_order,
        vec!["ingest".to_string(), "count".to_string(), "archive".to_string()]
    );
    assert!(validated.warnings.is_empty());
}

#[test]
fn missing_sink_is_a_parse_error() {
    let text = r#"
orphan:
  source:
    file: { path: "/tmp/in.log" }
"#;
    let err = parse(text).unwrap_err();
    assert!(format!("{err}").to_lowercase().contains("sink"));
}

#[test]
fn sink_link_missing_its_name_attribute_produces_a_warning_not_a_hard_error() {
    // `pipeline: {}` is still a well-formed plugin entry (a pipeline link
    // with no attributes), so it parses and validates; it just can't be
    // resolved to a downstream name, which the validator flags as a
    // warning rather than rejecting the whole document.
    let text = r#"
A:
  source:
    file: { path: "/tmp/in.log" }
  sink:
    - pipeline: {}
"#;
    let topology = parse(text).expect("document should parse");
    let validated = validate(&topology).expect("should validate with a warning");
    assert_eq!(validated.warnings.len(), 1);
    assert!(validated.warnings[0].contains('A'));
}
