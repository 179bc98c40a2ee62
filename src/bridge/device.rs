//! Device side of the bridge: connection upkeep and the per-device worker.

use crate::config::{DeviceConfig, PipelineTable};
use crate::pipeline::{Dispatcher, Packet};
use crate::registry::DeviceRegistry;
use crate::transport::{DeviceConnector, RadioEvent};
use crate::types::ConnectionStatus;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a worker wakes up to check the running flag
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Keeps one device connected, installing every new handle in the registry.
pub struct Reconnector {
    config: DeviceConfig,
    connector: Arc<dyn DeviceConnector>,
    devices: DeviceRegistry,
    events: Sender<RadioEvent>,
    running: Arc<AtomicBool>,
    status: ConnectionStatus,
    /// `connection_id` of the installed handle
    current: Option<u64>,
}

impl Reconnector {
    pub fn new(
        config: DeviceConfig,
        connector: Arc<dyn DeviceConnector>,
        devices: DeviceRegistry,
        events: Sender<RadioEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            connector,
            devices,
            events,
            running,
            status: ConnectionStatus::Disconnected,
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// True if `connection` is the connection currently installed.
    pub fn is_current(&self, connection: u64) -> bool {
        self.current == Some(connection)
    }

    /// One connection attempt. On success the new handle replaces the old one.
    pub fn try_connect(&mut self) -> bool {
        self.update_status(ConnectionStatus::Connecting);
        match self.connector.connect(&self.config, self.events.clone()) {
            Ok(handle) => {
                self.current = Some(handle.connection_id());
                self.devices.install(self.config.name.clone(), handle);
                self.update_status(ConnectionStatus::Connected);
                true
            }
            Err(e) => {
                tracing::error!(
                    "Device {} could not start on {}: {}",
                    self.config.name,
                    self.config.connection(),
                    e
                );
                self.update_status(ConnectionStatus::Error);
                false
            }
        }
    }

    /// Retry until connected. Returns `false` if the bridge stopped first.
    pub fn connect(&mut self) -> bool {
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        while self.running.load(Ordering::SeqCst) {
            if self.try_connect() {
                return true;
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        self.update_status(ConnectionStatus::Disconnected);
        false
    }

    /// Handle a connection-loss notification by reconnecting.
    pub fn on_connection_lost(&mut self) -> bool {
        tracing::warn!("Lost connection to device {}, reconnecting", self.config.name);
        self.update_status(ConnectionStatus::Disconnected);
        self.connect()
    }

    fn update_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            tracing::debug!("Device {}: {} -> {}", self.config.name, self.status, status);
            self.status = status;
        }
    }
}

/// Worker that owns one device's event channel.
pub struct DeviceSource {
    events: Receiver<RadioEvent>,
    reconnector: Reconnector,
    dispatcher: Dispatcher,
    pipelines: PipelineTable,
    running: Arc<AtomicBool>,
}

impl DeviceSource {
    pub fn new(
        events: Receiver<RadioEvent>,
        reconnector: Reconnector,
        dispatcher: Dispatcher,
        pipelines: PipelineTable,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            events,
            reconnector,
            dispatcher,
            pipelines,
            running,
        }
    }

    /// Run until the bridge stops.
    pub fn run(mut self) {
        tracing::debug!("Device worker {} started", self.reconnector.name());

        if self.reconnector.status() != ConnectionStatus::Connected && !self.reconnector.connect()
        {
            tracing::debug!("Device worker {} stopped", self.reconnector.name());
            return;
        }

        while self.running.load(Ordering::SeqCst) {
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::debug!("Device worker {} stopped", self.reconnector.name());
    }

    fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Received(packet) => self.on_receive(packet),
            RadioEvent::ConnectionEstablished => self.on_connection(),
            RadioEvent::ConnectionLost { connection } => {
                if self.reconnector.is_current(connection) {
                    self.reconnector.on_connection_lost();
                } else {
                    tracing::debug!(
                        "Ignoring loss of replaced connection {} to device {}",
                        connection,
                        self.reconnector.name()
                    );
                }
            }
        }
    }

    fn on_receive(&self, packet: Packet) {
        let name = self.reconnector.name();
        if self.pipelines.is_empty() {
            tracing::debug!(
                "No pipeline configured for device {}; only the packet filter runs",
                name
            );
        }
        self.dispatcher.dispatch(name, packet, &self.pipelines);
    }

    fn on_connection(&self) {
        let name = self.reconnector.name();
        let Some(device) = self.dispatcher.devices().get(name) else {
            return;
        };
        match device.my_node_info() {
            Ok(info) => tracing::info!(
                "Connected to device {}: node {} ({})",
                name,
                info.user_id,
                info.hw_model
            ),
            Err(e) => tracing::warn!("Connected to device {} but node info is unavailable: {}", name, e),
        }
    }
}
