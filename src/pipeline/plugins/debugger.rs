//! DebuggerPlugin: logs every packet that reaches it and passes it on.

use crate::config::PluginOptions;
use crate::pipeline::error::PluginResult;
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::pipeline::plugins::LogLevel;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use serde::Deserialize;

pub const NAME: &str = "debugger";

#[derive(Debug, Default, Deserialize)]
struct DebuggerOptions {
    #[serde(default)]
    log_level: LogLevel,
}

pub struct DebuggerPlugin {
    ctx: PluginContext,
}

impl DebuggerPlugin {
    pub fn new() -> Self {
        Self {
            ctx: PluginContext::default(),
        }
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn configure(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    ) {
        self.ctx.update(devices, brokers, options);
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        let options: DebuggerOptions = self.ctx.options(NAME)?;
        options
            .log_level
            .log(&format!("Debugger: {}", packet.to_payload()));
        Ok(Some(packet.clone()))
    }
}

impl Default for DebuggerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debugger_passes_through() {
        let mut plugin = DebuggerPlugin::new();
        plugin.configure(
            &DeviceRegistry::new(),
            &BrokerRegistry::new(),
            &json!({"log_level": "warn"}),
        );
        let pkt = Packet::from(json!({"id": 1}));
        assert_eq!(plugin.act(&pkt).unwrap(), Some(pkt));
    }

    #[test]
    fn test_debugger_rejects_unknown_level() {
        let mut plugin = DebuggerPlugin::new();
        plugin.configure(
            &DeviceRegistry::new(),
            &BrokerRegistry::new(),
            &json!({"log_level": "loud"}),
        );
        assert!(plugin.act(&Packet::from("x")).is_err());
    }
}
