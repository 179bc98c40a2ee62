//! Shared types used across the bridge
//!
//! Connection state for devices, node identity reported by a radio, and MQTT
//! reason codes delivered with broker acknowledgements.

use serde::{Deserialize, Serialize};

/// Connection status of a device or broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Not connected
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// The last connection attempt failed; another attempt follows
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// A geographic position reported by a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Identity of the node a radio is attached to, as returned by `my_node_info()`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node number on the mesh
    pub num: u32,
    /// User id, e.g. `!a1b2c3d4`
    pub user_id: String,
    /// Hardware model name
    pub hw_model: String,
    /// Last known position, if the node has one
    pub position: Option<Position>,
}

/// MQTT reason code as delivered with connect/publish/subscribe acknowledgements.
///
/// Values below `0x80` are successes (this includes granted QoS levels on
/// subscribe); `0x80` and above are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasonCode(pub u8);

impl ReasonCode {
    pub const SUCCESS: ReasonCode = ReasonCode(0x00);
    pub const UNSPECIFIED_ERROR: ReasonCode = ReasonCode(0x80);
    pub const NOT_AUTHORIZED: ReasonCode = ReasonCode(0x87);

    #[inline]
    pub fn is_failure(self) -> bool {
        self.0 >= 0x80
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            0x00 => "Success",
            0x01 => "Granted QoS 1",
            0x02 => "Granted QoS 2",
            0x80 => "Unspecified error",
            0x86 => "Bad user name or password",
            0x87 => "Not authorized",
            0x88 => "Server unavailable",
            _ if self.is_failure() => "Failure",
            _ => "Success",
        };
        write!(f, "{} (0x{:02X})", name, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_code_failure() {
        assert!(!ReasonCode::SUCCESS.is_failure());
        assert!(!ReasonCode(0x01).is_failure());
        assert!(ReasonCode::NOT_AUTHORIZED.is_failure());
    }

    #[test]
    fn test_reason_code_display() {
        assert_eq!(ReasonCode(0x87).to_string(), "Not authorized (0x87)");
        assert_eq!(ReasonCode(0x00).to_string(), "Success (0x00)");
    }

    #[test]
    fn test_connection_status_default() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::Connecting.to_string(), "Connecting...");
    }
}
