//! Collaborator interfaces for radio and MQTT transports
//!
//! The bridge never speaks the mesh radio protocol or the MQTT wire protocol
//! itself. A transport adapter implements the traits in this module:
//!
//! - [`MeshDevice`] / [`DeviceConnector`] for radios (serial or TCP)
//! - [`BrokerClient`] / [`BrokerConnector`] for MQTT brokers
//!
//! Connectors receive the sending half of a per-source channel and push
//! [`RadioEvent`]s or [`BrokerEvent`]s onto it from whatever thread the
//! transport runs on. Handles must be `Send + Sync`: they are shared through
//! the registries and used concurrently by plugins.
//!
//! [`memory`] provides an in-process implementation used by the test suite and
//! by the binary when no hardware adapter is linked.

pub mod memory;

use crate::config::{DeviceConfig, ServerSettings};
use crate::error::Result;
use crate::pipeline::Packet;
use crate::types::{NodeInfo, ReasonCode};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Node number used by the mesh for broadcast.
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;

/// Where a radio transmission is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// All nodes on the channel
    Broadcast,
    /// A node by number
    Node(u32),
    /// A node by user id, e.g. `!a1b2c3d4`
    NodeId(String),
}

/// MQTT quality of service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Notifications from a radio connection.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A packet was received from the mesh
    Received(Packet),
    /// The connection finished its handshake
    ConnectionEstablished,
    /// The connection with this [`MeshDevice::connection_id`] dropped
    ConnectionLost { connection: u64 },
}

/// Notifications from a broker connection.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Connection acknowledgement
    Connected(ReasonCode),
    /// Inbound message on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// Publish acknowledgement
    Published { message_id: u16, reason: ReasonCode },
    /// Subscribe acknowledgement, one code per requested topic
    Subscribed(Vec<ReasonCode>),
}

/// A live connection to a mesh radio.
pub trait MeshDevice: Send + Sync {
    /// Configured device name
    fn name(&self) -> &str;

    /// Distinguishes this connection from every other connection made to the
    /// same device
    fn connection_id(&self) -> u64;

    /// Identity of the attached node
    fn my_node_info(&self) -> Result<NodeInfo>;

    /// Send a text message
    fn send_text(&self, text: &str, destination: &Destination, channel_index: u32) -> Result<()>;

    /// Send an application payload on `portnum`
    fn send_data(
        &self,
        data: &[u8],
        portnum: &str,
        destination: &Destination,
        channel_index: u32,
    ) -> Result<()>;

    /// Close the connection
    fn close(&self) -> Result<()>;
}

/// Opens radio connections.
pub trait DeviceConnector: Send + Sync {
    /// Connect to the device described by `config`. Events for the new
    /// connection go to `events`.
    fn connect(&self, config: &DeviceConfig, events: Sender<RadioEvent>)
        -> Result<Arc<dyn MeshDevice>>;
}

/// A live MQTT client.
pub trait BrokerClient: Send + Sync {
    /// Configured broker name
    fn name(&self) -> &str;

    /// Publish `payload` on `topic`, returning the message id
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<u16>;

    /// Subscribe to `topic`
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Disconnect from the broker
    fn disconnect(&self) -> Result<()>;
}

/// Opens broker connections.
pub trait BrokerConnector: Send + Sync {
    /// Connect using `settings`. Callbacks for the client go to `events`.
    fn connect(
        &self,
        settings: &ServerSettings,
        events: Sender<BrokerEvent>,
    ) -> Result<Arc<dyn BrokerClient>>;
}
