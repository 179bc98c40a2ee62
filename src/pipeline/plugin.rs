//! Plugin abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Plugin` trait**: for plugins registered by an embedding application.
//! - **`BuiltinPlugin` enum**: for all built-in plugins, dispatched by match.
//!
//! `AnyPlugin` wraps either variant so the registry can handle both uniformly.

use crate::config::PluginOptions;
use crate::pipeline::error::{PluginError, PluginResult};
use crate::pipeline::packet::Packet;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use serde::de::DeserializeOwned;

/// Trait for user-defined plugins.
pub trait Plugin: Send {
    /// Name the plugin is registered under.
    fn name(&self) -> &str;

    /// Inject the current registries and this step's options. Must not block
    /// or fail; bad options are reported from `act`.
    fn configure(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    );

    /// Process one packet. `Ok(None)` halts the pipeline.
    fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>>;
}

/// State injected by `configure`, shared by the built-in plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    pub devices: DeviceRegistry,
    pub brokers: BrokerRegistry,
    pub options: PluginOptions,
}

impl PluginContext {
    pub fn update(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    ) {
        self.devices = devices.clone();
        self.brokers = brokers.clone();
        self.options = options.clone();
    }

    /// Deserialize the current options. A step without options reads as `{}`.
    pub fn options<T: DeserializeOwned>(&self, plugin: &str) -> PluginResult<T> {
        let value = match &self.options {
            PluginOptions::Null => PluginOptions::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| PluginError::invalid_options(plugin, e))
    }
}

use crate::pipeline::plugins::{
    DebuggerPlugin, DropPlugin, LocationFilterPlugin, MessageFilterPlugin, MqttPlugin,
    PacketFilterPlugin, PassthroughPlugin, RadioMessagePlugin, ScriptPlugin,
};

/// Enum dispatch for built-in plugins.
pub enum BuiltinPlugin {
    PacketFilter(PacketFilterPlugin),
    Debugger(DebuggerPlugin),
    MessageFilter(MessageFilterPlugin),
    LocationFilter(LocationFilterPlugin),
    Mqtt(MqttPlugin),
    RadioMessage(RadioMessagePlugin),
    Drop(DropPlugin),
    Passthrough(PassthroughPlugin),
    Script(ScriptPlugin),
}

/// Builds a fresh built-in plugin.
pub type BuiltinConstructor = fn() -> BuiltinPlugin;

impl BuiltinPlugin {
    /// A constructor for every built-in plugin.
    pub fn constructors() -> [BuiltinConstructor; 9] {
        [
            || BuiltinPlugin::PacketFilter(PacketFilterPlugin::new()),
            || BuiltinPlugin::Debugger(DebuggerPlugin::new()),
            || BuiltinPlugin::MessageFilter(MessageFilterPlugin::new()),
            || BuiltinPlugin::LocationFilter(LocationFilterPlugin::new()),
            || BuiltinPlugin::Mqtt(MqttPlugin::new()),
            || BuiltinPlugin::RadioMessage(RadioMessagePlugin::new()),
            || BuiltinPlugin::Drop(DropPlugin),
            || BuiltinPlugin::Passthrough(PassthroughPlugin),
            || BuiltinPlugin::Script(ScriptPlugin::new()),
        ]
    }

    /// One instance of every built-in plugin.
    pub fn all() -> Vec<BuiltinPlugin> {
        Self::constructors().iter().map(|make| make()).collect()
    }

    pub fn name(&self) -> &str {
        match self {
            BuiltinPlugin::PacketFilter(p) => p.name(),
            BuiltinPlugin::Debugger(p) => p.name(),
            BuiltinPlugin::MessageFilter(p) => p.name(),
            BuiltinPlugin::LocationFilter(p) => p.name(),
            BuiltinPlugin::Mqtt(p) => p.name(),
            BuiltinPlugin::RadioMessage(p) => p.name(),
            BuiltinPlugin::Drop(p) => p.name(),
            BuiltinPlugin::Passthrough(p) => p.name(),
            BuiltinPlugin::Script(p) => p.name(),
        }
    }

    pub fn configure(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    ) {
        match self {
            BuiltinPlugin::PacketFilter(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::Debugger(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::MessageFilter(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::LocationFilter(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::Mqtt(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::RadioMessage(p) => p.configure(devices, brokers, options),
            BuiltinPlugin::Drop(_) | BuiltinPlugin::Passthrough(_) => {}
            BuiltinPlugin::Script(p) => p.configure(devices, brokers, options),
        }
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        match self {
            BuiltinPlugin::PacketFilter(p) => p.act(packet),
            BuiltinPlugin::Debugger(p) => p.act(packet),
            BuiltinPlugin::MessageFilter(p) => p.act(packet),
            BuiltinPlugin::LocationFilter(p) => p.act(packet),
            BuiltinPlugin::Mqtt(p) => p.act(packet),
            BuiltinPlugin::RadioMessage(p) => p.act(packet),
            BuiltinPlugin::Drop(p) => p.act(packet),
            BuiltinPlugin::Passthrough(p) => p.act(packet),
            BuiltinPlugin::Script(p) => p.act(packet),
        }
    }
}

/// Wrapper that holds either a built-in plugin (enum dispatch) or a custom one (trait object).
pub enum AnyPlugin {
    Builtin(BuiltinPlugin),
    Custom(Box<dyn Plugin>),
}

impl AnyPlugin {
    pub fn name(&self) -> &str {
        match self {
            AnyPlugin::Builtin(p) => p.name(),
            AnyPlugin::Custom(p) => p.name(),
        }
    }

    pub fn configure(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    ) {
        match self {
            AnyPlugin::Builtin(p) => p.configure(devices, brokers, options),
            AnyPlugin::Custom(p) => p.configure(devices, brokers, options),
        }
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        match self {
            AnyPlugin::Builtin(p) => p.act(packet),
            AnyPlugin::Custom(p) => p.act(packet),
        }
    }
}

impl From<BuiltinPlugin> for AnyPlugin {
    fn from(plugin: BuiltinPlugin) -> Self {
        AnyPlugin::Builtin(plugin)
    }
}

impl<P: Plugin + 'static> From<Box<P>> for AnyPlugin {
    fn from(plugin: Box<P>) -> Self {
        AnyPlugin::Custom(plugin)
    }
}
