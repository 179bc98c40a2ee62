//! PacketFilterPlugin: the shared first step of every dispatch.
//!
//! Normalizes an inbound packet and decides whether it is eligible for any
//! pipeline at all:
//! - text payloads must parse as a JSON object, otherwise they are dropped;
//! - `raw` keys are stripped at every depth;
//! - byte-array `decoded.payload` values are re-encoded as base64 strings;
//! - a packet whose `id` was seen recently is a duplicate and is dropped.
//!
//! Instances made with [`PacketFilterPlugin::sibling`] share one window of
//! recent ids, so a packet echoed back through another source is still a
//! duplicate.

use crate::config::PluginOptions;
use crate::pipeline::error::PluginResult;
use crate::pipeline::packet::Packet;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use base64::Engine;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

pub const NAME: &str = "packet_filter";

/// Number of recent packet ids remembered for duplicate suppression.
pub const DEFAULT_DEDUP_WINDOW: usize = 256;

/// The last `window` packet ids, oldest first.
#[derive(Debug)]
struct RecentIds {
    window: usize,
    recent: VecDeque<u64>,
    seen: HashSet<u64>,
}

impl RecentIds {
    fn new(window: usize) -> Self {
        Self {
            window,
            recent: VecDeque::with_capacity(window),
            seen: HashSet::with_capacity(window),
        }
    }

    /// Remember `id`; returns `true` if it was already in the window.
    fn record(&mut self, id: u64) -> bool {
        if self.window == 0 {
            return false;
        }
        if self.seen.contains(&id) {
            return true;
        }
        if self.recent.len() >= self.window {
            if let Some(oldest) = self.recent.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.recent.push_back(id);
        self.seen.insert(id);
        false
    }
}

pub struct PacketFilterPlugin {
    recent: Arc<Mutex<RecentIds>>,
}

impl PacketFilterPlugin {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_DEDUP_WINDOW)
    }

    /// `window == 0` disables duplicate suppression.
    pub fn with_window(window: usize) -> Self {
        Self {
            recent: Arc::new(Mutex::new(RecentIds::new(window))),
        }
    }

    /// A new instance sharing this one's window of recent ids.
    pub fn sibling(&self) -> Self {
        Self {
            recent: self.recent.clone(),
        }
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn configure(
        &mut self,
        _devices: &DeviceRegistry,
        _brokers: &BrokerRegistry,
        _options: &PluginOptions,
    ) {
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        let mut value = match packet {
            Packet::Json(v) => v.clone(),
            Packet::Text(text) => match serde_json::from_str::<Value>(text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Dropping malformed packet: {}", e);
                    return Ok(None);
                }
            },
        };

        if !value.is_object() {
            tracing::warn!("Dropping packet that is not a JSON object");
            return Ok(None);
        }

        strip_raw(&mut value);
        encode_payload(&mut value);

        // id 0 is "unset" on the mesh
        if let Some(id) = value.get("id").and_then(Value::as_u64).filter(|&id| id != 0) {
            if self.record(id) {
                tracing::debug!("Dropping duplicate packet {}", id);
                return Ok(None);
            }
        }

        Ok(Some(Packet::Json(value)))
    }

    fn record(&self, id: u64) -> bool {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(id)
    }
}

impl Default for PacketFilterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_raw(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("raw");
            for child in map.values_mut() {
                strip_raw(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_raw(item);
            }
        }
        _ => {}
    }
}

/// Replace a byte-array `decoded.payload` with its base64 text.
fn encode_payload(value: &mut Value) {
    let Some(payload) = value
        .get_mut("decoded")
        .and_then(|d| d.get_mut("payload"))
    else {
        return;
    };
    let Value::Array(items) = payload else {
        return;
    };
    let bytes: Option<Vec<u8>> = items
        .iter()
        .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect();
    if let Some(bytes) = bytes {
        *payload = Value::String(base64::engine::general_purpose::STANDARD.encode(bytes));
    }
}
