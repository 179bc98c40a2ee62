//! Bridge runtime
//!
//! Starts one worker thread per configured broker and per active device,
//! each dispatching its inbound traffic through its own pipeline table.
//!
//! ```text
//! radio ──RadioEvent──► [device worker] ──► Dispatcher ──► plugins ──► brokers / radios
//! mqtt  ──BrokerEvent─► [broker worker] ──► Dispatcher ──► plugins ──► brokers / radios
//! ```
//!
//! Brokers are started first so that device pipelines can publish as soon as
//! the first packet arrives.

pub mod broker;
pub mod device;

pub use broker::BrokerSource;
pub use device::{DeviceSource, Reconnector};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result, ResultExt};
use crate::pipeline::{Dispatcher, PluginRegistry};
use crate::registry::{BrokerRegistry, DeviceRegistry};
use crate::transport::{BrokerConnector, DeviceConnector, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A running bridge
pub struct Bridge {
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Connect every broker and device in `config` and start their workers
    pub fn start(
        config: &BridgeConfig,
        plugins: PluginRegistry,
        device_connector: Arc<dyn DeviceConnector>,
        broker_connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::new(
            Arc::new(plugins),
            DeviceRegistry::new(),
            BrokerRegistry::new(),
        );
        let mut bridge = Self {
            dispatcher,
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
        };

        bridge.start_brokers(config, broker_connector.as_ref())?;
        bridge.start_devices(config, device_connector)?;

        tracing::info!(
            "Bridge started: {} device(s), {} broker(s)",
            bridge.dispatcher.devices().len(),
            bridge.dispatcher.brokers().len()
        );
        Ok(bridge)
    }

    fn start_brokers(&mut self, config: &BridgeConfig, connector: &dyn BrokerConnector) -> Result<()> {
        for server in &config.mqtt_servers {
            let settings = match server.settings() {
                Ok(settings) => settings,
                Err(missing) => {
                    for field in missing {
                        tracing::warn!(
                            "MQTT server {} is missing required field {}; skipping",
                            server.display_name(),
                            field
                        );
                    }
                    continue;
                }
            };

            let (tx, rx) = crossbeam_channel::unbounded();
            let client = match connector.connect(&settings, tx) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!("MQTT server {} could not start: {}", settings.name, e);
                    continue;
                }
            };
            self.dispatcher
                .brokers()
                .install(settings.name.clone(), client.clone());

            if let Some(topic) = &settings.topic {
                if let Err(e) = client.subscribe(topic, QoS::AtMostOnce) {
                    tracing::error!("Failed to subscribe {} on {}: {}", topic, settings.name, e);
                }
            }

            let source = BrokerSource::new(
                settings.name.clone(),
                rx,
                self.dispatcher.clone(),
                server.pipelines.clone().unwrap_or_default(),
                self.running.clone(),
            );
            let handle = std::thread::Builder::new()
                .name(format!("broker-{}", settings.name))
                .spawn(move || source.run())
                .map_err(BridgeError::from)
                .context(format!("Failed to start worker for MQTT server {}", settings.name))?;
            self.workers.push(handle);
        }
        Ok(())
    }

    fn start_devices(
        &mut self,
        config: &BridgeConfig,
        connector: Arc<dyn DeviceConnector>,
    ) -> Result<()> {
        for device in &config.devices {
            if !device.active {
                tracing::info!("Device {} is inactive; skipping", device.name);
                continue;
            }

            let (tx, rx) = crossbeam_channel::unbounded();
            let mut reconnector = Reconnector::new(
                device.clone(),
                connector.clone(),
                self.dispatcher.devices().clone(),
                tx,
                self.running.clone(),
            );
            // Failure here is retried inside the worker
            reconnector.try_connect();

            let source = DeviceSource::new(
                rx,
                reconnector,
                self.dispatcher.clone(),
                config.device_pipelines(device),
                self.running.clone(),
            );
            let handle = std::thread::Builder::new()
                .name(format!("device-{}", device.name))
                .spawn(move || source.run())
                .map_err(BridgeError::from)
                .with_context(|| format!("Failed to start worker for device {}", device.name))?;
            self.workers.push(handle);
        }
        Ok(())
    }

    pub fn devices(&self) -> &DeviceRegistry {
        self.dispatcher.devices()
    }

    pub fn brokers(&self) -> &BrokerRegistry {
        self.dispatcher.brokers()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop all workers, close every device and disconnect every broker
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down bridge");

        // Workers see the flag within one poll interval
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("A bridge worker panicked");
            }
        }

        for (name, device) in self.dispatcher.devices().drain() {
            if let Err(e) = device.close() {
                tracing::warn!("Failed to close device {}: {}", name, e);
            }
        }
        for (name, broker) in self.dispatcher.brokers().drain() {
            if let Err(e) = broker.disconnect() {
                tracing::warn!("Failed to disconnect broker {}: {}", name, e);
            }
        }
        tracing::info!("Bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
