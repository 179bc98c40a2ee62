//! MqttPlugin: publishes the packet to a named broker.

use crate::config::PluginOptions;
use crate::pipeline::error::{PluginError, PluginResult};
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use crate::transport::QoS;
use serde::Deserialize;

pub const NAME: &str = "mqtt_plugin";

#[derive(Debug, Deserialize)]
struct MqttOptions {
    /// Broker name as configured under `mqtt_servers`
    name: String,
    topic: String,
}

pub struct MqttPlugin {
    ctx: PluginContext,
}

impl MqttPlugin {
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
        let options: MqttOptions = self.ctx.options(NAME)?;
        let broker = self
            .ctx
            .brokers
            .get(&options.name)
            .ok_or_else(|| PluginError::UnknownBroker(options.name.clone()))?;

        let payload = packet.to_payload();
        let message_id = broker.publish(&options.topic, payload.as_bytes(), QoS::AtMostOnce)?;
        tracing::debug!(
            "Published message {} to {} on {}",
            message_id,
            options.topic,
            options.name
        );
        Ok(Some(packet.clone()))
    }
}

impl Default for MqttPlugin {
    fn default() -> Self {
        Self::new()
    }
}
