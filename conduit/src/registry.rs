// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Plugin registry and factory (C1).
//!
//! Four independent registries, one per plugin kind, each mapping a plugin
//! name to a constructor plus, for processors, a capability probe.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_domain::{
    Buffer, PluginKind, PluginLoadError, PluginSpec, Processor, ProcessorCapabilities, Sink,
    Source,
};

type ConstructFn<T> = Arc<dyn Fn(&PluginSpec) -> Result<Arc<T>, PluginLoadError> + Send + Sync>;

struct Registration<T: ?Sized> {
    construct: ConstructFn<T>,
}

/// A processor registration additionally carries a zero-argument capability
/// probe, since the factory must know single-thread/peer-forwarding affinity
/// *before* deciding how many instances to construct.
struct ProcessorRegistration {
    construct: ConstructFn<dyn Processor>,
    capabilities: ProcessorCapabilities,
}

/// Holds one constructor table per plugin kind, populated at bootstrap
/// composition time and read-only thereafter.
#[derive(Default)]
pub struct PluginRegistry {
    sources: HashMap<String, Registration<dyn Source>>,
    buffers: HashMap<String, Registration<dyn Buffer>>,
    processors: HashMap<String, ProcessorRegistration>,
    sinks: HashMap<String, Registration<dyn Sink>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<F>(&mut self, name: impl Into<String>, construct: F)
    where
        F: Fn(&PluginSpec) -> Result<Arc<dyn Source>, PluginLoadError> + Send + Sync + 'static,
    {
        self.sources.insert(
            name.into(),
            Registration {
                construct: Arc::new(construct),
            },
        );
    }

    pub fn register_buffer<F>(&mut self, name: impl Into<String>, construct: F)
    where
        F: Fn(&PluginSpec) -> Result<Arc<dyn Buffer>, PluginLoadError> + Send + Sync + 'static,
    {
        self.buffers.insert(
            name.into(),
            Registration {
                construct: Arc::new(construct),
            },
        );
    }

    pub fn register_processor<F>(
        &mut self,
        name: impl Into<String>,
        capabilities: ProcessorCapabilities,
        construct: F,
    ) where
        F: Fn(&PluginSpec) -> Result<Arc<dyn Processor>, PluginLoadError> + Send + Sync + 'static,
    {
        self.processors.insert(
            name.into(),
            ProcessorRegistration {
                construct: Arc::new(construct),
                capabilities,
            },
        );
    }

    pub fn register_sink<F>(&mut self, name: impl Into<String>, construct: F)
    where
        F: Fn(&PluginSpec) -> Result<Arc<dyn Sink>, PluginLoadError> + Send + Sync + 'static,
    {
        self.sinks.insert(
            name.into(),
            Registration {
                construct: Arc::new(construct),
            },
        );
    }
}

/// A built processor stage: either one instance shared by every worker, or
/// exactly `workers` instances, one per worker index.
pub enum ProcessorStage {
    Shared(Arc<dyn Processor>),
    PerWorker(Vec<Arc<dyn Processor>>),
}

impl ProcessorStage {
    /// The instance a given worker index should call.
    pub fn instance_for(&self, worker_index: usize) -> Arc<dyn Processor> {
        match self {
            ProcessorStage::Shared(p) => p.clone(),
            ProcessorStage::PerWorker(instances) => {
                instances[worker_index % instances.len()].clone()
            }
        }
    }

    pub fn capabilities(&self) -> ProcessorCapabilities {
        match self {
            ProcessorStage::Shared(p) => p.capabilities(),
            ProcessorStage::PerWorker(instances) => instances[0].capabilities(),
        }
    }
}

/// Wraps a [`PluginRegistry`] and exposes the `load_*` operations the
/// pipeline builder (C6) drives.
pub struct PluginFactory {
    registry: PluginRegistry,
}

impl PluginFactory {
    pub fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }

    pub fn load_source(&self, spec: &PluginSpec) -> Result<Arc<dyn Source>, PluginLoadError> {
        let reg = self
            .registry
            .sources
            .get(&spec.name)
            .ok_or_else(|| PluginLoadError::UnknownPlugin(spec.name.clone(), PluginKind::Source))?;
        (reg.construct)(spec)
    }

    pub fn load_buffer(&self, spec: &PluginSpec) -> Result<Arc<dyn Buffer>, PluginLoadError> {
        let reg = self
            .registry
            .buffers
            .get(&spec.name)
            .ok_or_else(|| PluginLoadError::UnknownPlugin(spec.name.clone(), PluginKind::Buffer))?;
        (reg.construct)(spec)
    }

    pub fn load_sink(&self, spec: &PluginSpec) -> Result<Arc<dyn Sink>, PluginLoadError> {
        let reg = self
            .registry
            .sinks
            .get(&spec.name)
            .ok_or_else(|| PluginLoadError::UnknownPlugin(spec.name.clone(), PluginKind::Sink))?;
        (reg.construct)(spec)
    }

    /// A processor type declaring single-thread affinity gets one instance
    /// per worker; otherwise a single shared instance. Construction is
    /// all-or-nothing — if any of the `workers` constructor calls for a
    /// per-worker stage fails, none of the already-built instances are kept.
    pub fn load_processor_stage(
        &self,
        spec: &PluginSpec,
        workers: u32,
    ) -> Result<ProcessorStage, PluginLoadError> {
        let reg = self.registry.processors.get(&spec.name).ok_or_else(|| {
            PluginLoadError::UnknownPlugin(spec.name.clone(), PluginKind::Processor)
        })?;

        if reg.capabilities.single_thread {
            let mut instances = Vec::with_capacity(workers as usize);
            for _ in 0..workers {
                instances.push((reg.construct)(spec)?);
            }
            Ok(ProcessorStage::PerWorker(instances))
        } else {
            let instance = (reg.construct)(spec)?;
            Ok(ProcessorStage::Shared(instance))
        }
    }
}

/// Reads a required string attribute off a [`conduit_domain::PluginSpec`].
fn string_attr(spec: &PluginSpec, key: &str) -> Result<String, PluginLoadError> {
    spec.attributes
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| PluginLoadError::InvalidConfig {
            name: spec.name.clone(),
            reason: format!("missing required attribute '{key}'"),
        })
}

/// Populates a [`PluginRegistry`] with the reference adapters under
/// `crate::adapters`: `file`/`stdout`/`file` source/sink pairs and the three
/// processors exercising each multiplicity rule. A composition root that
/// needs additional plugin types registers them the same way before handing
/// the registry to a [`PluginFactory`].
pub fn default_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    registry.register_source("file", |spec| {
        let path = string_attr(spec, "path")?;
        Ok(Arc::new(crate::adapters::source::LineFileSource::new(path)) as Arc<dyn Source>)
    });

    registry.register_sink("stdout", |_spec| {
        Ok(Arc::new(crate::adapters::sink::StdoutSink) as Arc<dyn Sink>)
    });
    registry.register_sink("file", |spec| {
        let path = string_attr(spec, "path")?;
        Ok(Arc::new(crate::adapters::sink::FileSink::new(path)) as Arc<dyn Sink>)
    });

    registry.register_processor(
        "passthrough",
        ProcessorCapabilities::default(),
        |_spec| Ok(Arc::new(crate::adapters::processor::PassthroughProcessor) as Arc<dyn Processor>),
    );
    registry.register_processor(
        "uppercase",
        ProcessorCapabilities {
            single_thread: true,
            ..Default::default()
        },
        |spec| {
            let field = string_attr(spec, "field")?;
            Ok(Arc::new(crate::adapters::processor::UppercaseProcessor::new(field))
                as Arc<dyn Processor>)
        },
    );
    registry.register_processor(
        "keyed-count",
        ProcessorCapabilities {
            requires_peer_forwarding: true,
            peer_forward_key_fields: vec!["key".to_string()],
            ..Default::default()
        },
        |spec| {
            let key = string_attr(spec, "key")?;
            Ok(Arc::new(crate::adapters::processor::KeyedCountProcessor::new(key))
                as Arc<dyn Processor>)
        },
    );

    registry
}
