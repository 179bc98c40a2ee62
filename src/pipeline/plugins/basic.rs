//! Trivial plugins: `drop` halts a pipeline, `passthrough` does nothing.

use crate::pipeline::error::PluginResult;
use crate::pipeline::packet::Packet;

pub struct DropPlugin;

impl DropPlugin {
    pub fn name(&self) -> &str {
        "drop"
    }

    pub fn act(&mut self, _packet: &Packet) -> PluginResult<Option<Packet>> {
        Ok(None)
    }
}

pub struct PassthroughPlugin;

impl PassthroughPlugin {
    pub fn name(&self) -> &str {
        "passthrough"
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        Ok(Some(packet.clone()))
    }
}
