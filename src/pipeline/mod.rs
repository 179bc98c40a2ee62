//! Plugin pipelines.
//!
//! Every packet a source receives is dispatched through that source's
//! pipeline table: a shared packet filter runs once, then each named pipeline
//! runs its ordered plugin steps from the filtered packet.
//!
//! # Architecture
//!
//! ```text
//!                         ┌─► [message_filter] ──► [mqtt_plugin]
//! [radio] ─► [packet_filter]
//!                         └─► [debugger]
//! [mqtt]  ─► [packet_filter] ─► [radio_message_plugin]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinPlugin` covers every shipped plugin.
//! - **Trait objects for extensions**: `AnyPlugin::Custom(Box<dyn Plugin>)`.
//! - **Absence is `Option`**: a plugin halts its pipeline by returning `Ok(None)`.
//! - **Outcomes are values**: each dispatch returns a `DispatchReport`.

pub mod dispatcher;
pub mod error;
pub mod packet;
pub mod plugin;
pub mod plugins;
pub mod registry;

pub use dispatcher::{
    DispatchReport, Dispatcher, FilterOutcome, PipelineReport, StepOutcome, PACKET_FILTER,
};
pub use error::{PluginError, PluginResult};
pub use packet::Packet;
pub use plugin::{AnyPlugin, BuiltinConstructor, BuiltinPlugin, Plugin, PluginContext};
pub use registry::{PluginFactory, PluginRegistry, PluginSet};
