//! ScriptPlugin: runs a Rhai script from the step's `script` option.
//!
//! See [`crate::scripting`] for what a script sees and may return.

use crate::config::PluginOptions;
use crate::pipeline::error::PluginResult;
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use crate::scripting::ScriptEngine;
use serde::Deserialize;

pub const NAME: &str = "script";

#[derive(Debug, Deserialize)]
struct ScriptOptions {
    script: String,
}

pub struct ScriptPlugin {
    ctx: PluginContext,
    engine: ScriptEngine,
}

impl ScriptPlugin {
    pub fn new() -> Self {
        Self {
            ctx: PluginContext::default(),
            engine: ScriptEngine::new(),
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
        let options: ScriptOptions = self.ctx.options(NAME)?;
        let script = self.engine.compile(&options.script)?;
        Ok(self.engine.run(&script, packet)?)
    }
}

impl Default for ScriptPlugin {
    fn default() -> Self {
        Self::new()
    }
}
