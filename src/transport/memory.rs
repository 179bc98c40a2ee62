//! In-memory transport
//!
//! Implements the transport traits without any hardware or network. Radios
//! and brokers are plain structs that record what was sent to them and let a
//! caller inject inbound traffic or connection failures.
//!
//! # Example
//!
//! ```ignore
//! use meshbridge::transport::memory::MemoryTransport;
//!
//! let transport = MemoryTransport::new();
//! transport.devices().fail_next("radio1", 2); // first two attempts fail
//!
//! let bridge = Bridge::start(&config, plugins, transport.devices(), transport.brokers())?;
//!
//! // Simulate a packet heard on the mesh
//! transport.devices().latest("radio1").unwrap().receive(json!({"id": 1}));
//! ```

use super::{
    BrokerClient, BrokerConnector, BrokerEvent, DeviceConnector, Destination, MeshDevice, QoS,
    RadioEvent,
};
use crate::config::{DeviceConfig, ServerSettings};
use crate::error::{BridgeError, Result};
use crate::pipeline::Packet;
use crate::types::{NodeInfo, ReasonCode};
use crossbeam_channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== Radio ====================

/// A transmission recorded by a [`MemoryDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Text {
        text: String,
        destination: Destination,
        channel_index: u32,
    },
    Data {
        data: Vec<u8>,
        portnum: String,
        destination: Destination,
        channel_index: u32,
    },
}

/// One connection to a simulated radio
pub struct MemoryDevice {
    name: String,
    /// 1 for the first connection, incremented on every reconnect
    generation: u64,
    node_info: NodeInfo,
    events: Sender<RadioEvent>,
    sent: Mutex<Vec<SentMessage>>,
    closed: AtomicBool,
}

impl MemoryDevice {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Simulate a packet arriving from the mesh
    pub fn receive(&self, packet: impl Into<Packet>) {
        let _ = self.events.send(RadioEvent::Received(packet.into()));
    }

    /// Simulate the link dropping
    pub fn lose_connection(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.events.send(RadioEvent::ConnectionLost {
            connection: self.generation,
        });
    }

    /// Everything sent through this connection so far
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::Transport(format!(
                "device {} is not connected",
                self.name
            )));
        }
        Ok(())
    }
}

impl MeshDevice for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection_id(&self) -> u64 {
        self.generation
    }

    fn my_node_info(&self) -> Result<NodeInfo> {
        self.ensure_open()?;
        Ok(self.node_info.clone())
    }

    fn send_text(&self, text: &str, destination: &Destination, channel_index: u32) -> Result<()> {
        self.ensure_open()?;
        lock(&self.sent).push(SentMessage::Text {
            text: text.to_string(),
            destination: destination.clone(),
            channel_index,
        });
        Ok(())
    }

    fn send_data(
        &self,
        data: &[u8],
        portnum: &str,
        destination: &Destination,
        channel_index: u32,
    ) -> Result<()> {
        self.ensure_open()?;
        lock(&self.sent).push(SentMessage::Data {
            data: data.to_vec(),
            portnum: portnum.to_string(),
            destination: destination.clone(),
            channel_index,
        });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`MemoryDevice`] connections and remembers every one of them
#[derive(Default)]
pub struct MemoryDeviceConnector {
    node_infos: Mutex<HashMap<String, NodeInfo>>,
    /// Remaining attempts that should fail, per device
    failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    connections: Mutex<HashMap<String, Vec<Arc<MemoryDevice>>>>,
}

impl MemoryDeviceConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node info reported by connections to `name`
    pub fn set_node_info(&self, name: &str, info: NodeInfo) {
        lock(&self.node_infos).insert(name.to_string(), info);
    }

    /// Make the next `attempts` connection attempts to `name` fail
    pub fn fail_next(&self, name: &str, attempts: u32) {
        lock(&self.failures).insert(name.to_string(), attempts);
    }

    /// Most recent connection to `name`
    pub fn latest(&self, name: &str) -> Option<Arc<MemoryDevice>> {
        lock(&self.connections)
            .get(name)
            .and_then(|list| list.last().cloned())
    }

    /// Every connection made to `name`, oldest first
    pub fn connections(&self, name: &str) -> Vec<Arc<MemoryDevice>> {
        lock(&self.connections).get(name).cloned().unwrap_or_default()
    }

    /// Number of successful connections made to `name`
    pub fn connection_count(&self, name: &str) -> usize {
        lock(&self.connections).get(name).map_or(0, Vec::len)
    }

    /// Number of connection attempts made to `name`, failed ones included
    pub fn attempts(&self, name: &str) -> u32 {
        lock(&self.attempts).get(name).copied().unwrap_or(0)
    }
}

impl DeviceConnector for MemoryDeviceConnector {
    fn connect(
        &self,
        config: &DeviceConfig,
        events: Sender<RadioEvent>,
    ) -> Result<Arc<dyn MeshDevice>> {
        *lock(&self.attempts).entry(config.name.clone()).or_insert(0) += 1;

        if let Some(remaining) = lock(&self.failures).get_mut(&config.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::Transport(format!(
                    "could not open {}",
                    config.connection()
                )));
            }
        }

        let node_info = lock(&self.node_infos)
            .get(&config.name)
            .cloned()
            .unwrap_or_else(|| NodeInfo {
                num: 0,
                user_id: format!("!{}", config.name),
                hw_model: "MEMORY".to_string(),
                position: None,
            });

        let mut connections = lock(&self.connections);
        let list = connections.entry(config.name.clone()).or_default();
        let device = Arc::new(MemoryDevice {
            name: config.name.clone(),
            generation: list.len() as u64 + 1,
            node_info,
            events: events.clone(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        list.push(Arc::clone(&device));
        drop(connections);

        let _ = events.send(RadioEvent::ConnectionEstablished);
        Ok(device)
    }
}

// ==================== MQTT ====================

/// A message recorded by [`MemoryBroker::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub message_id: u16,
}

impl PublishedMessage {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A simulated broker connection
pub struct MemoryBroker {
    settings: ServerSettings,
    events: Sender<BrokerEvent>,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
    next_message_id: AtomicU16,
    connected: AtomicBool,
}

impl MemoryBroker {
    /// Simulate an inbound message on `topic`
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let _ = self.events.send(BrokerEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.subscriptions).clone()
    }

    /// Settings this client was connected with
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl BrokerClient for MemoryBroker {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<u16> {
        if !self.is_connected() {
            return Err(BridgeError::Transport(format!(
                "broker {} is disconnected",
                self.settings.name
            )));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.published).push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            message_id,
        });
        let _ = self.events.send(BrokerEvent::Published {
            message_id,
            reason: ReasonCode::SUCCESS,
        });
        Ok(message_id)
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        lock(&self.subscriptions).push(topic.to_string());
        let _ = self
            .events
            .send(BrokerEvent::Subscribed(vec![ReasonCode(qos.level())]));
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`MemoryBroker`] clients
#[derive(Default)]
pub struct MemoryBrokerConnector {
    refused: Mutex<HashSet<String>>,
    brokers: Mutex<HashMap<String, Arc<MemoryBroker>>>,
}

impl MemoryBrokerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to the broker named `name`
    pub fn refuse(&self, name: &str) {
        lock(&self.refused).insert(name.to_string());
    }

    /// Client created for `name`
    pub fn broker(&self, name: &str) -> Option<Arc<MemoryBroker>> {
        lock(&self.brokers).get(name).cloned()
    }
}

impl BrokerConnector for MemoryBrokerConnector {
    fn connect(
        &self,
        settings: &ServerSettings,
        events: Sender<BrokerEvent>,
    ) -> Result<Arc<dyn BrokerClient>> {
        if lock(&self.refused).contains(&settings.name) {
            return Err(BridgeError::Transport(format!(
                "connection refused by {}:{}",
                settings.server, settings.port
            )));
        }

        let broker = Arc::new(MemoryBroker {
            settings: settings.clone(),
            events: events.clone(),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_message_id: AtomicU16::new(1),
            connected: AtomicBool::new(true),
        });
        lock(&self.brokers).insert(settings.name.clone(), Arc::clone(&broker));

        let _ = events.send(BrokerEvent::Connected(ReasonCode::SUCCESS));
        Ok(broker)
    }
}

/// Paired device and broker connectors
#[derive(Clone, Default)]
pub struct MemoryTransport {
    devices: Arc<MemoryDeviceConnector>,
    brokers: Arc<MemoryBrokerConnector>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> Arc<MemoryDeviceConnector> {
        Arc::clone(&self.devices)
    }

    pub fn brokers(&self) -> Arc<MemoryBrokerConnector> {
        Arc::clone(&self.brokers)
    }
}
