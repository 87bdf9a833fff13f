// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The topology validator (C3): rejects invalid topologies up front and
//! hands the builder (C6) a topological build order.

use std::collections::{HashMap, HashSet};

use conduit_domain::{PipelineSpec, TopologyError, TopologySpec};

/// Output of a successful validation pass.
#[derive(Debug, Clone)]
pub struct ValidatedTopology {
    /// Pipeline names in dependency order: for every edge upstream -> downstream,
    /// upstream appears before downstream.
    pub build_order: Vec<String>,
    /// Non-fatal observations (e.g. a pipeline with no externally-observable
    /// sink). The caller is responsible for logging these via `tracing::warn!`.
    pub warnings: Vec<String>,
}

/// A directed edge of the inter-pipeline reference graph: `upstream` feeds
/// into `downstream` through a single `PipelineConnector`. The same
/// connector relationship may be declared from either end (the upstream's
/// sink spec naming the downstream, the downstream's source spec naming the
/// upstream) — [`reference_edges`] dedups both declarations to one edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub upstream: String,
    pub downstream: String,
}

/// Computes the deduped set of inter-pipeline edges, used by both the
/// validator (cycle detection, build order) and the builder's unwind logic.
pub fn reference_edges(topology: &TopologySpec) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();

    let mut push_edge = |upstream: String, downstream: String| {
        let key = (upstream.clone(), downstream.clone());
        if seen.insert(key) {
            edges.push(Edge {
                upstream,
                downstream,
            });
        }
    };

    for spec in topology.iter() {
        if let Some(upstream) = spec.source_spec.pipeline_link_target() {
            push_edge(upstream.to_string(), spec.name.clone());
        }
        for sink in &spec.sink_specs {
            if let Some(downstream) = sink.pipeline_link_target() {
                push_edge(spec.name.clone(), downstream.to_string());
            }
        }
    }

    edges
}

fn referenced_names(spec: &PipelineSpec) -> Vec<&str> {
    let mut refs = Vec::new();
    if let Some(u) = spec.source_spec.pipeline_link_target() {
        refs.push(u);
    }
    for sink in &spec.sink_specs {
        if let Some(d) = sink.pipeline_link_target() {
            refs.push(d);
        }
    }
    refs
}

/// Validates `topology`, returning a build order or the first
/// [`TopologyError`] encountered.
///
/// Steps:
/// 1. Pipeline-name uniqueness and non-emptiness.
/// 2. Every `pipeline`-link reference resolves to a pipeline that exists.
/// 3. The inter-pipeline reference graph is acyclic (DFS cycle detection).
/// 4. A topological order is produced, ties broken by insertion order.
/// 5. Pipelines with no externally-observable sink produce a warning.
pub fn validate(topology: &TopologySpec) -> Result<ValidatedTopology, TopologyError> {
    let mut seen = HashSet::new();
    for spec in topology.iter() {
        if spec.name.is_empty() {
            return Err(TopologyError::EmptyName);
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(TopologyError::DuplicateName(spec.name.clone()));
        }
    }

    for spec in topology.iter() {
        for reference in referenced_names(spec) {
            if !topology.contains(reference) {
                return Err(TopologyError::UnknownReference {
                    from: spec.name.clone(),
                    to: reference.to_string(),
                });
            }
        }
    }

    let edges = reference_edges(topology);
    let build_order = topological_sort(topology, &edges)?;

    let mut warnings = Vec::new();
    for spec in topology.iter() {
        let has_observable_sink = spec
            .sink_specs
            .iter()
            .any(|sink| !sink.is_pipeline_link() || sink.pipeline_link_target().is_some());
        if !has_observable_sink {
            warnings.push(format!(
                "pipeline '{}' has no sink whose downstream is observable",
                spec.name
            ));
        }
    }

    Ok(ValidatedTopology {
        build_order,
        warnings,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

/// DFS-based topological sort: for every edge `upstream -> downstream`,
/// `upstream` is ordered before `downstream`. Ties are broken by the
/// topology's insertion order (iteration order of `topology.iter()`).
fn topological_sort(topology: &TopologySpec, edges: &[Edge]) -> Result<Vec<String>, TopologyError> {
    let mut downstream_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        downstream_of
            .entry(edge.upstream.as_str())
            .or_default()
            .push(edge.downstream.as_str());
    }

    let mut state: HashMap<&str, VisitState> = HashMap::new();
    let mut order = Vec::with_capacity(topology.len());
    let mut stack_path: Vec<String> = Vec::new();

    for spec in topology.iter() {
        visit(
            &spec.name,
            &downstream_of,
            &mut state,
            &mut order,
            &mut stack_path,
        )?;
    }

    Ok(order)
}

fn visit<'a>(
    name: &'a str,
    downstream_of: &HashMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, VisitState>,
    order: &mut Vec<String>,
    stack_path: &mut Vec<String>,
) -> Result<(), TopologyError> {
    match state.get(name) {
        Some(VisitState::Done) => return Ok(()),
        Some(VisitState::InProgress) => {
            let cycle_start = stack_path.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack_path[cycle_start..].to_vec();
            cycle.push(name.to_string());
            return Err(TopologyError::Cycle(cycle));
        }
        None => {}
    }

    state.insert(name, VisitState::InProgress);
    stack_path.push(name.to_string());

    if let Some(downstreams) = downstream_of.get(name) {
        for downstream in downstreams.clone() {
            visit(downstream, downstream_of, state, order, stack_path)?;
        }
    }

    stack_path.pop();
    state.insert(name, VisitState::Done);
    order.push(name.to_string());
    Ok(())
}
