//! Built-in plugins.

pub mod basic;
pub mod debugger;
pub mod location_filter;
pub mod message_filter;
pub mod mqtt_forward;
pub mod packet_filter;
pub mod radio_forward;
pub mod rhai_script;

pub use basic::{DropPlugin, PassthroughPlugin};
pub use debugger::DebuggerPlugin;
pub use location_filter::LocationFilterPlugin;
pub use message_filter::MessageFilterPlugin;
pub use mqtt_forward::MqttPlugin;
pub use packet_filter::PacketFilterPlugin;
pub use radio_forward::RadioMessagePlugin;
pub use rhai_script::ScriptPlugin;

use serde::Deserialize;

/// Level a plugin writes its diagnostic lines at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn log(self, message: &str) {
        match self {
            LogLevel::Trace => tracing::trace!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
    }
}
