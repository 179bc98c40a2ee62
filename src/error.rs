//! Error handling for the meshbridge application
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration loading, transports and the bridge runtime. Plugin failures
//! have their own type in [`crate::pipeline::error`].

use thiserror::Error;

/// Main error type for meshbridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Errors reported by a device or broker transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Script compilation or execution errors
    #[error("Script error: {0}")]
    Script(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

/// Result type alias for meshbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Transport("radio1 unreachable".to_string());
        assert_eq!(err.to_string(), "Transport error: radio1 unreachable");
    }

    #[test]
    fn test_error_with_context() {
        let err = BridgeError::Transport("socket closed".to_string());
        let with_ctx = err.with_context("Failed to publish");
        assert!(with_ctx.to_string().contains("Failed to publish"));
        assert!(with_ctx.to_string().contains("socket closed"));
    }

    #[test]
    fn test_result_ext_lazy_context() {
        let result: Result<()> = Err(BridgeError::Serialization("bad port".to_string()));
        let err = result
            .with_context(|| format!("mqtt server {}", "local"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "mqtt server local: Serialization error: bad port"
        );
    }
}
