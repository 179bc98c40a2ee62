//! Configuration module for meshbridge
//!
//! The bridge reads one configuration document at startup:
//!
//! ```yaml
//! devices:
//!   - name: radio1
//!     tcp: 192.168.1.20
//!     pipelines:
//!       to-mqtt:
//!         - mqtt_plugin: { name: local, topic: mesh/rx }
//!
//! mqtt_servers:
//!   - name: local
//!     server: localhost
//!     port: 1883
//!     topic: mesh/tx
//!     pipelines:
//!       to-radio:
//!         - radio_message_plugin: { device: radio1 }
//!
//! pipelines:            # used by devices that declare none of their own
//!   debug:
//!     - debugger:
//! ```
//!
//! The path defaults to [`DEFAULT_CONFIG_PATH`] and can be overridden with the
//! [`CONFIG_PATH_ENV`] environment variable. The format follows the file
//! extension: `.yaml`/`.yml`, `.toml` or `.json`.

pub mod pipelines;

pub use pipelines::{PipelineSpec, PipelineStep, PipelineTable, PluginOptions};

use crate::error::{BridgeError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration file read when no override is set
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "MESHBRIDGE_CONFIG";

/// MQTT keep-alive interval in seconds
pub const DEFAULT_KEEPALIVE_SECS: u16 = 60;

/// Resolve the configuration path
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ==================== Devices ====================

fn default_true() -> bool {
    true
}

/// A mesh radio entry under `devices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Stable name used by plugins to address this device
    pub name: String,

    /// `false` excludes the device entirely
    #[serde(default = "default_true")]
    pub active: bool,

    /// Serial device path, e.g. `/dev/ttyUSB0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,

    /// TCP host of a network-attached radio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,

    /// Pipelines for packets received by this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<PipelineTable>,

    /// Pause between failed reconnect attempts (0 = retry immediately)
    #[serde(default)]
    pub reconnect_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            active: true,
            serial: None,
            tcp: None,
            pipelines: None,
            reconnect_delay_ms: 0,
        }
    }
}

/// How a device is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceConnection {
    /// Serial port; `None` means the default local port
    Serial(Option<String>),
    /// TCP host
    Tcp(String),
}

impl fmt::Display for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceConnection::Serial(Some(path)) => write!(f, "serial:{}", path),
            DeviceConnection::Serial(None) => write!(f, "serial:default"),
            DeviceConnection::Tcp(host) => write!(f, "tcp:{}", host),
        }
    }
}

impl DeviceConfig {
    /// Serial wins over TCP when both are given.
    pub fn connection(&self) -> DeviceConnection {
        match (&self.serial, &self.tcp) {
            (Some(path), _) => DeviceConnection::Serial(Some(path.clone())),
            (None, Some(host)) => DeviceConnection::Tcp(host.clone()),
            (None, None) => DeviceConnection::Serial(None),
        }
    }
}

// ==================== MQTT servers ====================

/// An entry under `mqtt_servers`, as written.
///
/// Required fields are optional here so a missing one can be reported as a
/// warning instead of failing the whole document; see [`MqttServerConfig::settings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MqttServerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Use TLS without certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Topic to subscribe to (QoS 0)
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub pipelines: Option<PipelineTable>,
}

/// Username/password pair for a broker
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated connection settings handed to a [`crate::transport::BrokerConnector`]
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub client_id: Option<String>,
    /// Present only when both username and password were configured
    pub credentials: Option<Credentials>,
    pub insecure: bool,
    pub topic: Option<String>,
    pub keepalive_secs: u16,
}

impl ServerSettings {
    pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            port,
            client_id: None,
            credentials: None,
            insecure: false,
            topic: None,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

impl MqttServerConfig {
    /// Required fields that are absent
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.server.is_none() {
            missing.push("server");
        }
        if self.port.is_none() {
            missing.push("port");
        }
        missing
    }

    /// Connection settings, or the list of missing required fields.
    pub fn settings(&self) -> std::result::Result<ServerSettings, Vec<&'static str>> {
        let (Some(name), Some(server), Some(port)) = (&self.name, &self.server, self.port) else {
            return Err(self.missing_fields());
        };

        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(ServerSettings {
            name: name.clone(),
            server: server.clone(),
            port,
            client_id: self.client_id.clone(),
            credentials,
            insecure: self.insecure,
            topic: self.topic.clone(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        })
    }

    /// Name for log lines, also when the name itself is missing
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

// ==================== Bridge config ====================

/// The whole configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub mqtt_servers: Vec<MqttServerConfig>,

    /// Fallback table for devices without their own `pipelines`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<PipelineTable>,
}

/// Document formats accepted by [`BridgeConfig::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format implied by a file extension; anything unknown is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl BridgeConfig {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(BridgeError::from)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// Parse a document in the given format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| BridgeError::Serialization(e.to_string()))?,
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| BridgeError::Serialization(e.to_string()))?
            }
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Pipelines for packets received by `device`
    pub fn device_pipelines(&self, device: &DeviceConfig) -> PipelineTable {
        device
            .pipelines
            .as_ref()
            .or(self.pipelines.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}
