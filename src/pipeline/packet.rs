//! The packet value routed through pipelines.
//!
//! Radio transports deliver decoded packets as JSON trees; MQTT delivers raw
//! text. The dispatcher treats both as opaque and only hands them to plugins.

use serde_json::Value;

/// An in-flight packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Structured packet (decoded radio packet or normalized MQTT payload).
    Json(Value),
    /// Raw text payload as received from a broker.
    Text(String),
}

impl Packet {
    /// Borrow the JSON body, if this is a structured packet.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Packet::Json(v) => Some(v),
            Packet::Text(_) => None,
        }
    }

    /// Borrow the text body, if this is a raw text packet.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Packet::Text(s) => Some(s),
            Packet::Json(_) => None,
        }
    }

    /// Look up a nested field by path, e.g. `["decoded", "portnum"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self.as_json()?;
        for key in path {
            current = current.get(key)?;
        }
        Some(current)
    }

    /// Nested string field, see [`Packet::field`].
    pub fn str_field(&self, path: &[&str]) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    /// Packet id, when the packet carries a numeric `id`.
    pub fn id(&self) -> Option<u64> {
        self.field(&["id"]).and_then(Value::as_u64)
    }

    /// Serialize for publishing: JSON bodies are encoded, text is sent as is.
    pub fn to_payload(&self) -> String {
        match self {
            Packet::Json(v) => v.to_string(),
            Packet::Text(s) => s.clone(),
        }
    }
}

impl From<Value> for Packet {
    fn from(value: Value) -> Self {
        Packet::Json(value)
    }
}

impl From<String> for Packet {
    fn from(text: String) -> Self {
        Packet::Text(text)
    }
}

impl From<&str> for Packet {
    fn from(text: &str) -> Self {
        Packet::Text(text.to_string())
    }
}
