//! LocationFilterPlugin: drops position reports outside a radius.
//!
//! The reference point is either given explicitly (`latitude` + `longitude`)
//! or taken from a connected device's own node position (`device`).

use crate::config::PluginOptions;
use crate::pipeline::error::{PluginError, PluginResult};
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use crate::types::Position;
use serde::Deserialize;
use serde_json::Value;

pub const NAME: &str = "location_filter";

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two positions.
pub fn haversine_km(a: Position, b: Position) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Default, Deserialize)]
struct LocationFilterOptions {
    max_distance_km: Option<f64>,
    device: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct LocationFilterPlugin {
    ctx: PluginContext,
}

impl LocationFilterPlugin {
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
        let options: LocationFilterOptions = self.ctx.options(NAME)?;

        let Some(max_distance) = options.max_distance_km else {
            tracing::warn!("Location filter has no max_distance_km; passing packet");
            return Ok(Some(packet.clone()));
        };
        let Some(position) = packet_position(packet) else {
            return Ok(Some(packet.clone()));
        };
        let Some(reference) = self.reference(&options)? else {
            tracing::warn!("Location filter has no reference point; passing packet");
            return Ok(Some(packet.clone()));
        };

        let distance = haversine_km(reference, position);
        if distance > max_distance {
            tracing::debug!(
                "Location filter: {:.2} km exceeds {:.2} km, dropping",
                distance,
                max_distance
            );
            return Ok(None);
        }
        Ok(Some(packet.clone()))
    }

    fn reference(&self, options: &LocationFilterOptions) -> PluginResult<Option<Position>> {
        if let (Some(latitude), Some(longitude)) = (options.latitude, options.longitude) {
            return Ok(Some(Position {
                latitude,
                longitude,
            }));
        }
        let Some(name) = &options.device else {
            return Ok(None);
        };
        let device = self
            .ctx
            .devices
            .get(name)
            .ok_or_else(|| PluginError::UnknownDevice(name.clone()))?;
        Ok(device.my_node_info()?.position)
    }
}

impl Default for LocationFilterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn packet_position(packet: &Packet) -> Option<Position> {
    let position = packet.field(&["decoded", "position"])?;
    Some(Position {
        latitude: position.get("latitude").and_then(Value::as_f64)?,
        longitude: position.get("longitude").and_then(Value::as_f64)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::transport::memory::MemoryDeviceConnector;
    use crate::transport::DeviceConnector;
    use crate::types::NodeInfo;
    use serde_json::json;

    fn report(latitude: f64, longitude: f64) -> Packet {
        Packet::from(json!({
            "decoded": {
                "portnum": "POSITION_APP",
                "position": { "latitude": latitude, "longitude": longitude }
            }
        }))
    }

    fn run(devices: &DeviceRegistry, options: Value, packet: &Packet) -> PluginResult<Option<Packet>> {
        let mut plugin = LocationFilterPlugin::new();
        plugin.configure(devices, &BrokerRegistry::new(), &options);
        plugin.act(packet)
    }

    #[test]
    fn test_haversine_known_distance() {
        let london = Position {
            latitude: 51.5074,
            longitude: -0.1278,
        };
        let paris = Position {
            latitude: 48.8566,
            longitude: 2.3522,
        };
        let d = haversine_km(london, paris);
        assert!((d - 343.5).abs() < 1.0, "got {}", d);
        assert!(haversine_km(london, london).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_reference() {
        let devices = DeviceRegistry::new();
        let opts = json!({"max_distance_km": 10.0, "latitude": 51.5, "longitude": -0.12});
        assert!(run(&devices, opts.clone(), &report(51.51, -0.13))
            .unwrap()
            .is_some());
        assert!(run(&devices, opts, &report(48.85, 2.35)).unwrap().is_none());
    }

    #[test]
    fn test_packets_without_position_pass() {
        let opts = json!({"max_distance_km": 1.0, "latitude": 0.0, "longitude": 0.0});
        let pkt = Packet::from(json!({"decoded": {"portnum": "TEXT_MESSAGE_APP"}}));
        assert!(run(&DeviceRegistry::new(), opts, &pkt).unwrap().is_some());
    }

    #[test]
    fn test_device_reference() {
        let connector = MemoryDeviceConnector::new();
        connector.set_node_info(
            "base",
            NodeInfo {
                position: Some(Position {
                    latitude: 10.0,
                    longitude: 10.0,
                }),
                ..Default::default()
            },
        );
        let (tx, _rx) = crossbeam_channel::unbounded();
        let config = DeviceConfig {
            name: "base".into(),
            ..Default::default()
        };
        let devices = DeviceRegistry::new();
        devices.install("base", connector.connect(&config, tx).unwrap());

        let opts = json!({"max_distance_km": 50.0, "device": "base"});
        assert!(run(&devices, opts.clone(), &report(10.1, 10.1)).unwrap().is_some());
        assert!(run(&devices, opts, &report(20.0, 20.0)).unwrap().is_none());
    }

    #[test]
    fn test_unknown_device_reference() {
        let opts = json!({"max_distance_km": 5.0, "device": "ghost"});
        let err = run(&DeviceRegistry::new(), opts, &report(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, PluginError::UnknownDevice(ref n) if n == "ghost"));
    }
}
