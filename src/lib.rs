//! # meshbridge: mesh radio ⇄ MQTT pipeline bridge
//!
//! Bridges mesh-radio devices and MQTT brokers through ordered chains of
//! named plugins. Every packet a source receives is dispatched through that
//! source's pipeline table: a shared packet filter runs once, then each
//! pipeline runs its steps in order until one of them halts.
//!
//! ## Architecture
//!
//! - **Transport**: traits for radios and brokers, plus an in-memory implementation
//! - **Registry**: name to live handle maps shared with plugins
//! - **Pipeline**: packet filter, dispatcher and the built-in plugins
//! - **Bridge**: one worker thread per device and per broker
//! - **Scripting**: Rhai scripts as an ad hoc pipeline step
//!
//! ## Example
//!
//! ```ignore
//! use meshbridge::{config::BridgeConfig, pipeline::PluginRegistry, transport::memory::MemoryTransport, Bridge};
//!
//! let config = BridgeConfig::load("config.yaml")?;
//! let transport = MemoryTransport::new();
//! let bridge = Bridge::start(&config, PluginRegistry::with_builtins(), transport.devices(), transport.brokers())?;
//! // ...
//! bridge.shutdown();
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod scripting;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use bridge::Bridge;
pub use config::{BridgeConfig, DeviceConfig, MqttServerConfig, PipelineTable};
pub use error::{BridgeError, Result};
pub use pipeline::{Dispatcher, Packet, Plugin, PluginRegistry};
pub use registry::{BrokerRegistry, DeviceRegistry};
pub use scripting::ScriptEngine;
pub use types::{ConnectionStatus, NodeInfo, ReasonCode};
