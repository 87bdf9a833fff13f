// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A minimal, explicitly **non-authoritative** loader for the declarative
//! topology document schema. The core (C2-C7) only ever consumes the
//! in-memory [`TopologySpec`]; this loader exists so the CLI and tests have
//! something to parse YAML with. Any stricter or differently-shaped
//! production parser can replace this module without touching the rest of
//! the crate.

use std::collections::HashSet;
use std::time::Duration;

use conduit_domain::{PipelineSpec, PluginSpec, TopologyError, TopologySpec};
use serde_yaml::Value as YamlValue;

/// Parses a topology document from its YAML text.
///
/// `serde_yaml`'s default deserializer silently keeps the last of a
/// duplicate mapping key; that would hide a malformed document, so this
/// loader first parses into a `serde_yaml::Mapping` and rejects duplicate
/// keys at every mapping level before converting to the strongly-typed
/// model.
pub fn parse(text: &str) -> Result<TopologySpec, TopologyError> {
    let root: YamlValue =
        serde_yaml::from_str(text).map_err(|e| TopologyError::ParseError(e.to_string()))?;
    let mapping = root
        .as_mapping()
        .ok_or_else(|| TopologyError::ParseError("document root must be a mapping".into()))?;

    check_no_duplicate_keys(mapping)?;

    let mut topology = TopologySpec::new();
    for (name_value, body) in mapping {
        let name = name_value
            .as_str()
            .ok_or_else(|| TopologyError::ParseError("pipeline name must be a string".into()))?
            .to_string();
        let spec = parse_pipeline(&name, body)?;
        topology.push(spec);
    }
    Ok(topology)
}

fn check_no_duplicate_keys(mapping: &serde_yaml::Mapping) -> Result<(), TopologyError> {
    let mut seen = HashSet::new();
    for key in mapping.keys() {
        let rendered = serde_yaml::to_string(key).unwrap_or_default();
        if !seen.insert(rendered.clone()) {
            return Err(TopologyError::DuplicateKey(rendered));
        }
        if let Some(nested) = key.as_mapping() {
            check_no_duplicate_keys(nested)?;
        }
    }
    for value in mapping.values() {
        if let Some(nested) = value.as_mapping() {
            check_no_duplicate_keys(nested)?;
        }
        if let Some(seq) = value.as_sequence() {
            for item in seq {
                if let Some(nested) = item.as_mapping() {
                    check_no_duplicate_keys(nested)?;
                }
            }
        }
    }
    Ok(())
}

fn parse_pipeline(name: &str, body: &YamlValue) -> Result<PipelineSpec, TopologyError> {
    let mapping = body
        .as_mapping()
        .ok_or_else(|| TopologyError::MissingField(name.to_string(), "pipeline body"))?;

    let workers = mapping
        .get(YamlValue::String("workers".into()))
        .and_then(YamlValue::as_u64)
        .map(|w| w as u32)
        .unwrap_or(1);

    let read_batch_delay = mapping
        .get(YamlValue::String("delay".into()))
        .and_then(YamlValue::as_str)
        .map(parse_duration)
        .transpose()?
        .unwrap_or(Duration::from_secs(3));

    let source_spec = mapping
        .get(YamlValue::String("source".into()))
        .ok_or_else(|| TopologyError::MissingField(name.to_string(), "source"))
        .and_then(parse_plugin_spec)?;

    let buffer_spec = mapping
        .get(YamlValue::String("buffer".into()))
        .map(parse_plugin_spec)
        .transpose()?;

    let processor_specs = mapping
        .get(YamlValue::String("processor".into()))
        .map(parse_plugin_spec_list)
        .transpose()?
        .unwrap_or_default();

    let sink_specs = mapping
        .get(YamlValue::String("sink".into()))
        .ok_or_else(|| TopologyError::MissingField(name.to_string(), "sink"))
        .and_then(parse_plugin_spec_list)?;
    if sink_specs.is_empty() {
        return Err(TopologyError::MissingField(name.to_string(), "sink"));
    }

    Ok(PipelineSpec {
        name: name.to_string(),
        workers,
        read_batch_delay,
        source_spec,
        buffer_spec,
        processor_specs,
        sink_specs,
    })
}

fn parse_duration(text: &str) -> Result<Duration, TopologyError> {
    let text = text.trim();
    let (digits, unit) = text
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| text.split_at(i))
        .unwrap_or((text, "s"));
    let value: u64 = digits
        .parse()
        .map_err(|_| TopologyError::ParseError(format!("invalid duration '{text}'")))?;
    let duration = match unit {
        "s" | "" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value * 60),
        other => {
            return Err(TopologyError::ParseError(format!(
                "unknown duration unit '{other}'"
            )))
        }
    };
    Ok(duration)
}

/// A plugin entry is a single-key mapping `{ <pluginName>: {attrs...} }`.
fn parse_plugin_spec(value: &YamlValue) -> Result<PluginSpec, TopologyError> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| TopologyError::ParseError("plugin entry must be a mapping".into()))?;
    if mapping.len() != 1 {
        return Err(TopologyError::ParseError(
            "plugin entry must have exactly one key".into(),
        ));
    }
    let (name_value, attrs_value) = mapping.iter().next().expect("len checked above");
    let name = name_value
        .as_str()
        .ok_or_else(|| TopologyError::ParseError("plugin name must be a string".into()))?
        .to_string();

    let attributes = match attrs_value {
        YamlValue::Null => serde_json::Map::new(),
        other => {
            let json: serde_json::Value = serde_yaml::from_value(other.clone())
                .map_err(|e| TopologyError::ParseError(e.to_string()))?;
            json.as_object().cloned().unwrap_or_default()
        }
    };

    Ok(PluginSpec { name, attributes })
}

fn parse_plugin_spec_list(value: &YamlValue) -> Result<Vec<PluginSpec>, TopologyError> {
    let seq = value
        .as_sequence()
        .ok_or_else(|| TopologyError::ParseError("expected a sequence of plugin entries".into()))?;
    seq.iter().map(parse_plugin_spec).collect()
}
