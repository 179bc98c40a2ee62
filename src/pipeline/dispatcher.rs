//! Dispatcher: routes one inbound packet through every configured pipeline.
//!
//! For each dispatch:
//! 1. Run the shared packet filter once on the raw packet.
//! 2. Run each pipeline, in configured order, from the filtered packet.
//! 3. Within a pipeline, run steps in order until one halts.
//!
//! A failing step is logged and skipped; the packet it received carries on to
//! the next step. Nothing inside a dispatch is fatal to the caller.
//!
//! Each source dispatches through its own plugin instances, created on its
//! first dispatch. Dispatches from one source run one at a time; dispatches
//! from different sources never wait on each other.

use crate::config::{PipelineSpec, PipelineTable, PluginOptions};
use crate::pipeline::error::{PluginError, PluginResult};
use crate::pipeline::packet::Packet;
use crate::pipeline::plugins::packet_filter;
use crate::pipeline::registry::{PluginRegistry, PluginSet};
use crate::registry::{BrokerRegistry, DeviceRegistry};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// Registry name of the shared first step.
pub const PACKET_FILTER: &str = packet_filter::NAME;

/// What the packet filter decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Passed,
    Dropped,
    Failed(String),
    /// No packet filter is registered; the raw packet was used as is.
    Missing,
}

/// What happened at one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    /// The step halted the pipeline.
    Dropped,
    UnknownPlugin,
    Failed(String),
    /// An earlier step halted the pipeline.
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub name: String,
    pub steps: Vec<StepOutcome>,
}

impl PipelineReport {
    /// True if the pipeline ran to its end without being halted.
    pub fn completed(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s, StepOutcome::Dropped | StepOutcome::NotRun))
    }

    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, StepOutcome::Failed(_) | StepOutcome::UnknownPlugin))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub source: String,
    pub filter: FilterOutcome,
    pub pipelines: Vec<PipelineReport>,
}

impl DispatchReport {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// True if the packet filter stopped the packet before any pipeline ran.
    pub fn filtered_out(&self) -> bool {
        matches!(self.filter, FilterOutcome::Dropped | FilterOutcome::Failed(_))
    }
}

/// Runs pipelines against the plugin, device and broker registries it holds.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    plugins: Arc<PluginRegistry>,
    instances: Arc<Mutex<HashMap<String, Arc<Mutex<PluginSet>>>>>,
    devices: DeviceRegistry,
    brokers: BrokerRegistry,
}

impl Dispatcher {
    pub fn new(plugins: Arc<PluginRegistry>, devices: DeviceRegistry, brokers: BrokerRegistry) -> Self {
        Self {
            plugins,
            instances: Arc::default(),
            devices,
            brokers,
        }
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn brokers(&self) -> &BrokerRegistry {
        &self.brokers
    }

    /// Dispatch `packet`, received from `source`, through every pipeline in `table`.
    pub fn dispatch(&self, source: &str, packet: Packet, table: &PipelineTable) -> DispatchReport {
        let mut report = DispatchReport {
            source: source.to_string(),
            filter: FilterOutcome::Passed,
            pipelines: Vec::with_capacity(table.len()),
        };

        let set = self.plugin_set(source);
        let mut plugins = set.lock().unwrap_or_else(PoisonError::into_inner);

        let filtered = match plugins
            .get_mut(PACKET_FILTER)
            .map(|filter| guarded(|| filter.act(&packet)))
        {
            Some(Ok(Some(filtered))) => filtered,
            Some(Ok(None)) => {
                tracing::debug!("Packet from {} rejected by {}", source, PACKET_FILTER);
                report.filter = FilterOutcome::Dropped;
                return report;
            }
            Some(Err(e)) => {
                tracing::error!("{} failed on packet from {}: {}", PACKET_FILTER, source, e);
                report.filter = FilterOutcome::Failed(e.to_string());
                return report;
            }
            None => {
                tracing::warn!(
                    "No {} registered; dispatching unfiltered packet from {}",
                    PACKET_FILTER,
                    source
                );
                report.filter = FilterOutcome::Missing;
                packet
            }
        };

        for pipeline in table {
            report
                .pipelines
                .push(self.run_pipeline(&mut plugins, source, pipeline, &filtered));
        }
        report
    }

    /// The plugin instances `source` dispatches through.
    fn plugin_set(&self, source: &str) -> Arc<Mutex<PluginSet>> {
        let mut sets = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        sets.entry(source.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating plugin instances for {}", source);
                Arc::new(Mutex::new(self.plugins.instantiate()))
            })
            .clone()
    }

    fn run_pipeline(
        &self,
        plugins: &mut PluginSet,
        source: &str,
        pipeline: &PipelineSpec,
        filtered: &Packet,
    ) -> PipelineReport {
        tracing::debug!("Pipeline {} initiated for {}", pipeline.name, source);

        let mut steps = Vec::with_capacity(pipeline.steps.len());
        let mut current = Some(filtered.clone());

        for (index, step) in pipeline.steps.iter().enumerate() {
            let Some(packet) = current.take() else {
                steps.push(StepOutcome::NotRun);
                continue;
            };

            match self.run_step(plugins, &step.plugin, &step.options, &packet) {
                None => {
                    tracing::error!("No such plugin: {}. Skipping", step.plugin);
                    steps.push(StepOutcome::UnknownPlugin);
                    current = Some(packet);
                }
                Some(Ok(Some(next))) => {
                    steps.push(StepOutcome::Passed);
                    current = Some(next);
                }
                Some(Ok(None)) => {
                    tracing::debug!(
                        "Pipeline {} halted by {} at step {}",
                        pipeline.name,
                        step.plugin,
                        index
                    );
                    steps.push(StepOutcome::Dropped);
                }
                Some(Err(e)) => {
                    tracing::error!(
                        "Hit an error in pipeline {} (source {}, step {}, plugin {}): {}",
                        pipeline.name,
                        source,
                        index,
                        step.plugin,
                        e
                    );
                    steps.push(StepOutcome::Failed(e.to_string()));
                    current = Some(packet);
                }
            }
        }

        if current.is_some() {
            tracing::debug!("Pipeline {} completed", pipeline.name);
        }
        PipelineReport {
            name: pipeline.name.clone(),
            steps,
        }
    }

    fn run_step(
        &self,
        plugins: &mut PluginSet,
        plugin: &str,
        options: &PluginOptions,
        packet: &Packet,
    ) -> Option<PluginResult<Option<Packet>>> {
        let p = plugins.get_mut(plugin)?;
        Some(guarded(|| {
            p.configure(&self.devices, &self.brokers, options);
            p.act(packet)
        }))
    }
}

/// Turn a panic inside a plugin into a step failure.
fn guarded(f: impl FnOnce() -> PluginResult<Option<Packet>>) -> PluginResult<Option<Packet>> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(PluginError::Panicked(message))
    })
}
