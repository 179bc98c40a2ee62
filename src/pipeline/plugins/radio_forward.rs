//! RadioMessagePlugin: transmits the packet through a named radio device.
//!
//! Text messages (`TEXT_MESSAGE_APP` with `decoded.text`, or a raw text
//! packet) are sent as text. Anything else is sent as data using
//! `decoded.payload` (base64 string or byte array) and `decoded.portnum`.
//!
//! The destination is, in order of precedence: the `to` option, the `to_id`
//! option, the packet's own `to` unless it is the broadcast address, and
//! finally broadcast.

use crate::config::PluginOptions;
use crate::pipeline::error::{PluginError, PluginResult};
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use crate::transport::{Destination, BROADCAST_NUM};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

pub const NAME: &str = "radio_message_plugin";

const TEXT_MESSAGE_APP: &str = "TEXT_MESSAGE_APP";
const DEFAULT_DATA_PORT: &str = "PRIVATE_APP";

#[derive(Debug, Deserialize)]
struct RadioMessageOptions {
    device: String,
    #[serde(default)]
    to: Option<u32>,
    #[serde(default)]
    to_id: Option<String>,
    #[serde(default)]
    channel_index: u32,
}

pub struct RadioMessagePlugin {
    ctx: PluginContext,
}

impl RadioMessagePlugin {
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
        let options: RadioMessageOptions = self.ctx.options(NAME)?;
        let device = self
            .ctx
            .devices
            .get(&options.device)
            .ok_or_else(|| PluginError::UnknownDevice(options.device.clone()))?;
        let destination = destination(&options, packet);

        if let Some(text) = message_text(packet) {
            device.send_text(text, &destination, options.channel_index)?;
            tracing::debug!("Sent text to {:?} via {}", destination, options.device);
            return Ok(Some(packet.clone()));
        }

        let data = payload_bytes(packet)?;
        let portnum = packet
            .str_field(&["decoded", "portnum"])
            .unwrap_or(DEFAULT_DATA_PORT);
        device.send_data(&data, portnum, &destination, options.channel_index)?;
        tracing::debug!(
            "Sent {} bytes on {} to {:?} via {}",
            data.len(),
            portnum,
            destination,
            options.device
        );
        Ok(Some(packet.clone()))
    }
}

impl Default for RadioMessagePlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn destination(options: &RadioMessageOptions, packet: &Packet) -> Destination {
    if let Some(num) = options.to {
        return num_destination(num);
    }
    if let Some(id) = &options.to_id {
        return Destination::NodeId(id.clone());
    }
    packet
        .field(&["to"])
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .map_or(Destination::Broadcast, num_destination)
}

fn num_destination(num: u32) -> Destination {
    if num == BROADCAST_NUM {
        Destination::Broadcast
    } else {
        Destination::Node(num)
    }
}

fn message_text(packet: &Packet) -> Option<&str> {
    match packet {
        Packet::Text(text) => Some(text),
        Packet::Json(_) => {
            if packet.str_field(&["decoded", "portnum"]) == Some(TEXT_MESSAGE_APP) {
                packet.str_field(&["decoded", "text"])
            } else {
                None
            }
        }
    }
}

fn payload_bytes(packet: &Packet) -> PluginResult<Vec<u8>> {
    match packet.field(&["decoded", "payload"]) {
        Some(Value::String(encoded)) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PluginError::Malformed(format!("payload is not base64: {}", e))),
        Some(Value::Array(items)) => items
            .iter()
            .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| PluginError::Malformed("payload is not a byte array".into())),
        _ => Err(PluginError::Malformed("packet has no decoded.payload".into())),
    }
}
