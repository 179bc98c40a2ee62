//! Test data builders for creating test objects

use meshbridge::config::{DeviceConfig, MqttServerConfig, PipelineStep, PipelineTable};
use meshbridge::BridgeConfig;
use serde_json::{json, Value};

/// Builder for a pipeline table
#[derive(Default)]
pub struct TableBuilder {
    table: PipelineTable,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline whose steps take no options
    pub fn pipeline(mut self, name: &str, plugins: &[&str]) -> Self {
        let steps = plugins.iter().map(|p| PipelineStep::bare(*p)).collect();
        assert!(self.table.push(name, steps), "duplicate pipeline {}", name);
        self
    }

    /// Add a pipeline from explicit steps
    pub fn steps(mut self, name: &str, steps: Vec<PipelineStep>) -> Self {
        assert!(self.table.push(name, steps), "duplicate pipeline {}", name);
        self
    }

    pub fn build(self) -> PipelineTable {
        self.table
    }
}

/// A step with options
pub fn step(plugin: &str, options: Value) -> PipelineStep {
    PipelineStep::new(plugin, options)
}

/// Builder for a whole bridge configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: BridgeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, name: &str, pipelines: PipelineTable) -> Self {
        self.config.devices.push(DeviceConfig {
            name: name.to_string(),
            tcp: Some(format!("{}.local", name)),
            pipelines: Some(pipelines),
            ..Default::default()
        });
        self
    }

    pub fn inactive_device(mut self, name: &str) -> Self {
        self.config.devices.push(DeviceConfig {
            name: name.to_string(),
            active: false,
            ..Default::default()
        });
        self
    }

    pub fn broker(mut self, name: &str, topic: Option<&str>, pipelines: PipelineTable) -> Self {
        self.config.mqtt_servers.push(MqttServerConfig {
            name: Some(name.to_string()),
            server: Some("localhost".to_string()),
            port: Some(1883),
            topic: topic.map(str::to_string),
            pipelines: Some(pipelines),
            ..Default::default()
        });
        self
    }

    pub fn server(mut self, server: MqttServerConfig) -> Self {
        self.config.mqtt_servers.push(server);
        self
    }

    pub fn fallback(mut self, pipelines: PipelineTable) -> Self {
        self.config.pipelines = Some(pipelines);
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

/// A decoded text message as a radio would deliver it
pub fn text_packet(id: u64, text: &str) -> Value {
    json!({
        "id": id,
        "from": 1234,
        "fromId": "!000004d2",
        "to": 4294967295u64,
        "toId": "^all",
        "raw": "opaque",
        "decoded": { "portnum": "TEXT_MESSAGE_APP", "text": text }
    })
}

/// [`text_packet`] after the packet filter
pub fn filtered_text_packet(id: u64, text: &str) -> Value {
    let mut value = text_packet(id, text);
    if let Some(map) = value.as_object_mut() {
        map.remove("raw");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableBuilder::new()
            .pipeline("a", &["debugger", "drop"])
            .pipeline("b", &[])
            .build();
        assert_eq!(table.names(), vec!["a", "b"]);
        assert_eq!(table.get("a").unwrap().steps.len(), 2);
    }
}
