// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-memory topology model (C2): the shape an external parser must produce.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The reserved plugin name denoting an in-process link to another pipeline.
pub const PIPELINE_LINK_NAME: &str = "pipeline";

/// A plugin name plus an untyped mapping of configuration attributes.
/// `attributes` is owned by the topology model and immutable after parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Whether this spec denotes an in-process link to another pipeline
    /// rather than a real plugin.
    pub fn is_pipeline_link(&self) -> bool {
        self.name == PIPELINE_LINK_NAME
    }

    /// The name of the linked pipeline, when this spec is a pipeline link.
    pub fn pipeline_link_target(&self) -> Option<&str> {
        if !self.is_pipeline_link() {
            return None;
        }
        self.attributes.get("name").and_then(Value::as_str)
    }
}

/// One named pipeline: source, buffer, ordered processor stages, and sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default = "default_workers")]
    pub workers: u32,
    #[serde(default = "default_read_batch_delay", with = "duration_secs")]
    pub read_batch_delay: Duration,
    pub source_spec: PluginSpec,
    #[serde(default)]
    pub buffer_spec: Option<PluginSpec>,
    #[serde(default)]
    pub processor_specs: Vec<PluginSpec>,
    pub sink_specs: Vec<PluginSpec>,
}

fn default_workers() -> u32 {
    1
}

fn default_read_batch_delay() -> Duration {
    Duration::from_secs(3)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl PipelineSpec {
    /// The pipeline names this spec's source and sinks reference via
    /// `pipeline` links — the inter-pipeline reference graph edges.
    pub fn referenced_pipelines(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        if let Some(target) = self.source_spec.pipeline_link_target() {
            refs.push(target);
        }
        for sink in &self.sink_specs {
            if let Some(target) = sink.pipeline_link_target() {
                refs.push(target);
            }
        }
        refs
    }
}

/// An ordered collection of [`PipelineSpec`]s produced by an external parser,
/// preserving insertion order for the validator's tie-break rule.
#[derive(Debug, Clone, Default)]
pub struct TopologySpec {
    pipelines: Vec<PipelineSpec>,
    index: HashMap<String, usize>,
}

impl TopologySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pipeline spec, returning `false` without inserting if the
    /// name is already present (duplicate-name detection is the validator's
    /// job; this only prevents the index from silently losing an entry).
    pub fn push(&mut self, spec: PipelineSpec) -> bool {
        if self.index.contains_key(&spec.name) {
            return false;
        }
        self.index.insert(spec.name.clone(), self.pipelines.len());
        self.pipelines.push(spec);
        true
    }

    pub fn get(&self, name: &str) -> Option<&PipelineSpec> {
        self.index.get(name).map(|&i| &self.pipelines[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineSpec> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(|p| p.name.as_str())
    }
}

impl FromIterator<PipelineSpec> for TopologySpec {
    fn from_iter<T: IntoIterator<Item = PipelineSpec>>(iter: T) -> Self {
        let mut topology = TopologySpec::new();
        for spec in iter {
            topology.push(spec);
        }
        topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_link(target: &str) -> PluginSpec {
        PluginSpec::new(PIPELINE_LINK_NAME)
            .with_attribute("name", Value::String(target.to_string()))
    }

    #[test]
    fn pipeline_link_round_trips_target_name() {
        let spec = pipeline_link("downstream");
        assert!(spec.is_pipeline_link());
        assert_eq!(spec.pipeline_link_target(), Some("downstream"));
    }

    #[test]
    fn non_pipeline_spec_has_no_link_target() {
        let spec = PluginSpec::new("stdout");
        assert!(!spec.is_pipeline_link());
        assert_eq!(spec.pipeline_link_target(), None);
    }

    #[test]
    fn referenced_pipelines_collects_source_and_sink_links() {
        let spec = PipelineSpec {
            name: "p".into(),
            workers: 1,
            read_batch_delay: default_read_batch_delay(),
            source_spec: pipeline_link("a"),
            buffer_spec: None,
            processor_specs: vec![],
            sink_specs: vec![pipeline_link("b"), PluginSpec::new("stdout")],
        };
        assert_eq!(spec.referenced_pipelines(), vec!["a", "b"]);
    }

    #[test]
    fn topology_spec_rejects_duplicate_insert() {
        let mut topology = TopologySpec::new();
        let a = PipelineSpec {
            name: "a".into(),
            workers: 1,
            read_batch_delay: default_read_batch_delay(),
            source_spec: PluginSpec::new("stdin"),
            buffer_spec: None,
            processor_specs: vec![],
            sink_specs: vec![PluginSpec::new("stdout")],
        };
        assert!(topology.push(a.clone()));
        assert!(!topology.push(a));
        assert_eq!(topology.len(), 1);
    }
}
