//! MessageFilterPlugin: allow/deny rules on application, sender and recipient.
//!
//! Options:
//! ```yaml
//! - message_filter:
//!     app:  { allow: [TEXT_MESSAGE_APP, POSITION_APP] }
//!     from: { disallow: ["!deadbeef"] }
//!     to:   { allow: ["^all"] }
//!     log_level: info
//! ```
//! `app` matches `decoded.portnum`, `from` matches `fromId` (or the numeric
//! `from`), `to` matches `toId` (or `to`). A non-empty `allow` list requires
//! the field to be present and listed.

use crate::config::PluginOptions;
use crate::pipeline::error::PluginResult;
use crate::pipeline::packet::Packet;
use crate::pipeline::plugin::PluginContext;
use crate::pipeline::plugins::LogLevel;
use crate::registry::{BrokerRegistry, DeviceRegistry};
use serde::Deserialize;
use serde_json::Value;

pub const NAME: &str = "message_filter";

/// Allow/deny lists for one packet field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub disallow: Vec<String>,
}

impl Rule {
    pub fn permits(&self, value: Option<&str>) -> bool {
        if !self.allow.is_empty() {
            match value {
                Some(v) if self.allow.iter().any(|a| a == v) => {}
                _ => return false,
            }
        }
        match value {
            Some(v) => !self.disallow.iter().any(|d| d == v),
            None => true,
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Debug
}

#[derive(Debug, Deserialize)]
struct MessageFilterOptions {
    #[serde(default)]
    app: Rule,
    #[serde(default)]
    from: Rule,
    #[serde(default)]
    to: Rule,
    #[serde(default = "default_log_level")]
    log_level: LogLevel,
}

/// String form of an identity field, preferring the `*Id` spelling.
fn identity(packet: &Packet, id_key: &str, num_key: &str) -> Option<String> {
    if let Some(id) = packet.str_field(&[id_key]) {
        return Some(id.to_string());
    }
    match packet.field(&[num_key])? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub struct MessageFilterPlugin {
    ctx: PluginContext,
}

impl MessageFilterPlugin {
    pub fn new() -> Self {
        Self {
            ctx: PluginContext::default(),
        }
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn configure(
        &mut self,
        devices: &DeviceRegistry,
        brokers: &BrokerRegistry,
        options: &PluginOptions,
    ) {
        self.ctx.update(devices, brokers, options);
    }

    pub fn act(&mut self, packet: &Packet) -> PluginResult<Option<Packet>> {
        let options: MessageFilterOptions = self.ctx.options(NAME)?;

        let app = packet.str_field(&["decoded", "portnum"]);
        if !options.app.permits(app) {
            options
                .log_level
                .log(&format!("Message filter: app {:?} not permitted", app));
            return Ok(None);
        }

        let from = identity(packet, "fromId", "from");
        if !options.from.permits(from.as_deref()) {
            options
                .log_level
                .log(&format!("Message filter: sender {:?} not permitted", from));
            return Ok(None);
        }

        let to = identity(packet, "toId", "to");
        if !options.to.permits(to.as_deref()) {
            options
                .log_level
                .log(&format!("Message filter: recipient {:?} not permitted", to));
            return Ok(None);
        }

        Ok(Some(packet.clone()))
    }
}

impl Default for MessageFilterPlugin {
    fn default() -> Self {
        Self::new()
    }
}
