//! Mock construction helpers

use crossbeam_channel::{Receiver, Sender};
use meshbridge::config::PluginOptions;
use meshbridge::error::Result;
use meshbridge::pipeline::{Packet, Plugin, PluginError, PluginResult};
use meshbridge::registry::{BrokerRegistry, DeviceRegistry};
use meshbridge::transport::{BrokerClient, QoS};
use mockall::mock;
use serde_json::json;
use std::sync::{Arc, Mutex};

mock! {
    pub Broker {}

    impl BrokerClient for Broker {
        fn name(&self) -> &str;
        fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<u16>;
        fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;
        fn disconnect(&self) -> Result<()>;
    }
}

/// Packets and options seen by a [`RecordingPlugin`]
#[derive(Clone, Default)]
pub struct Recorder {
    packets: Arc<Mutex<Vec<Packet>>>,
    options: Arc<Mutex<Vec<PluginOptions>>>,
}

impl Recorder {
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn options(&self) -> Vec<PluginOptions> {
        self.options.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.packets.lock().unwrap().len()
    }
}

/// Passes every packet through unchanged and records it
pub struct RecordingPlugin {
    name: String,
    recorder: Recorder,
}

/// A factory for recording plugins and the handle to inspect them.
///
/// Every instance the factory builds records into the same [`Recorder`].
pub fn recording(
    name: &str,
) -> (impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static, Recorder) {
    let recorder = Recorder::default();
    let name = name.to_string();
    let handle = recorder.clone();
    let factory = move || -> Box<dyn Plugin> {
        Box::new(RecordingPlugin {
            name: name.clone(),
            recorder: handle.clone(),
        })
    };
    (factory, recorder)
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, _: &DeviceRegistry, _: &BrokerRegistry, options: &PluginOptions) {
        self.recorder.options.lock().unwrap().push(options.clone());
    }

    fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        self.recorder.packets.lock().unwrap().push(packet.clone());
        Ok(Some(packet.clone()))
    }
}

/// Always fails from `act`
pub struct FailingPlugin(pub &'static str);

impl Plugin for FailingPlugin {
    fn name(&self) -> &str {
        self.0
    }

    fn configure(&mut self, _: &DeviceRegistry, _: &BrokerRegistry, _: &PluginOptions) {}

    fn act(&mut self, _: &Packet) -> PluginResult<Option<Packet>> {
        Err(PluginError::Transport("induced failure".to_string()))
    }
}

/// Marks packets with `"transformed": true`
pub struct TransformPlugin(pub &'static str);

impl Plugin for TransformPlugin {
    fn name(&self) -> &str {
        self.0
    }

    fn configure(&mut self, _: &DeviceRegistry, _: &BrokerRegistry, _: &PluginOptions) {}

    fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        match packet.as_json() {
            Some(value) => {
                let mut value = value.clone();
                value["transformed"] = json!(true);
                Ok(Some(Packet::Json(value)))
            }
            None => Ok(Some(packet.clone())),
        }
    }
}

/// A packet filter that rejects everything
pub struct RejectAllFilter;

impl Plugin for RejectAllFilter {
    fn name(&self) -> &str {
        "packet_filter"
    }

    fn configure(&mut self, _: &DeviceRegistry, _: &BrokerRegistry, _: &PluginOptions) {}

    fn act(&mut self, _: &Packet) -> PluginResult<Option<Packet>> {
        Ok(None)
    }
}

/// Blocks in `act` on packet `id` until released; other packets pass.
pub struct GatedPlugin {
    pub id: u64,
    pub entered: Sender<u64>,
    pub release: Receiver<()>,
}

impl Plugin for GatedPlugin {
    fn name(&self) -> &str {
        "gated"
    }

    fn configure(&mut self, _: &DeviceRegistry, _: &BrokerRegistry, _: &PluginOptions) {}

    fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        if packet.id() == Some(self.id) {
            let _ = self.entered.send(self.id);
            let _ = self.release.recv();
        }
        Ok(Some(packet.clone()))
    }
}
