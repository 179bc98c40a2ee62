//! Plugin-specific error types.

use thiserror::Error;

/// Errors a plugin can raise from `act`.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid options for {plugin}: {message}")]
    InvalidOptions { plugin: String, message: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown broker: {0}")]
    UnknownBroker(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Plugin panicked: {0}")]
    Panicked(String),
}

impl PluginError {
    pub fn invalid_options(plugin: impl Into<String>, message: impl ToString) -> Self {
        PluginError::InvalidOptions {
            plugin: plugin.into(),
            message: message.to_string(),
        }
    }
}

impl From<crate::error::BridgeError> for PluginError {
    fn from(err: crate::error::BridgeError) -> Self {
        use crate::error::BridgeError;
        match err {
            BridgeError::Script(message) => PluginError::Script(message),
            other => PluginError::Transport(other.to_string()),
        }
    }
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;
