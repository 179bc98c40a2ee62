//! Pipeline tables
//!
//! A pipeline table is written as a mapping of pipeline name to a list of
//! single-key mappings:
//!
//! ```yaml
//! pipelines:
//!   radio-to-mqtt:
//!     - message_filter:
//!         app:
//!           allow: [TEXT_MESSAGE_APP]
//!     - mqtt_plugin:
//!         name: local
//!         topic: mesh/rx
//! ```
//!
//! Both levels are order-significant, so the table deserializes through map
//! visitors into vectors instead of a hash map. A step mapping with several
//! keys expands to one step per key, in document order.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Plugin-specific options for one step. `Null` when the step has none.
pub type PluginOptions = serde_json::Value;

/// One `(plugin name, options)` step.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub plugin: String,
    pub options: PluginOptions,
}

impl PipelineStep {
    pub fn new(plugin: impl Into<String>, options: PluginOptions) -> Self {
        Self {
            plugin: plugin.into(),
            options,
        }
    }

    /// Step without options
    pub fn bare(plugin: impl Into<String>) -> Self {
        Self::new(plugin, PluginOptions::Null)
    }
}

/// A named, ordered chain of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub name: String,
    pub steps: Vec<PipelineStep>,
}

/// Ordered pipelines for one packet source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineTable {
    pipelines: Vec<PipelineSpec>,
}

impl PipelineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pipeline. Returns `false` (and leaves the table unchanged) if
    /// a pipeline with this name already exists.
    pub fn push(&mut self, name: impl Into<String>, steps: Vec<PipelineStep>) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            return false;
        }
        self.pipelines.push(PipelineSpec { name, steps });
        true
    }

    /// Builder-style [`PipelineTable::push`]; a duplicate name is ignored.
    pub fn with_pipeline(mut self, name: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        self.push(name, steps);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PipelineSpec> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineSpec> {
        self.pipelines.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl<'a> IntoIterator for &'a PipelineTable {
    type Item = &'a PipelineSpec;
    type IntoIter = std::slice::Iter<'a, PipelineSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.pipelines.iter()
    }
}

// ── Deserialization ──

/// The steps written in one list entry (normally exactly one).
struct StepMapping(Vec<PipelineStep>);

impl<'de> Deserialize<'de> for StepMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepVisitor;

        impl<'de> Visitor<'de> for StepVisitor {
            type Value = StepMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of plugin name to options, or a plugin name")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StepMapping(vec![PipelineStep::bare(v)]))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut steps = Vec::new();
                while let Some((plugin, options)) = map.next_entry::<String, PluginOptions>()? {
                    steps.push(PipelineStep::new(plugin, options));
                }
                Ok(StepMapping(steps))
            }
        }

        deserializer.deserialize_any(StepVisitor)
    }
}

impl<'de> Deserialize<'de> for PipelineTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PipelineTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of pipeline name to a list of plugin steps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut table = PipelineTable::new();
                let mut seen = HashSet::new();
                while let Some(name) = map.next_key::<String>()? {
                    if !seen.insert(name.clone()) {
                        return Err(de::Error::custom(format!(
                            "duplicate pipeline name: {}",
                            name
                        )));
                    }
                    let entries: Option<Vec<StepMapping>> = map.next_value()?;
                    let steps = entries
                        .unwrap_or_default()
                        .into_iter()
                        .flat_map(|m| m.0)
                        .collect();
                    table.push(name, steps);
                }
                Ok(table)
            }

            // An empty `pipelines:` key
            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(PipelineTable::new())
            }
        }

        deserializer.deserialize_any(TableVisitor)
    }
}

impl Serialize for PipelineTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Step<'a>(&'a PipelineStep);

        impl Serialize for Step<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&self.0.plugin, &self.0.options)?;
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.pipelines.len()))?;
        for pipeline in &self.pipelines {
            let steps: Vec<Step<'_>> = pipeline.steps.iter().map(Step).collect();
            map.serialize_entry(&pipeline.name, &steps)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_order_is_preserved() {
        let yaml = r#"
zeta:
  - debugger:
alpha:
  - message_filter:
      app:
        allow: [TEXT_MESSAGE_APP]
  - mqtt_plugin:
      name: local
      topic: mesh/rx
"#;
        let table: PipelineTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.names(), vec!["zeta", "alpha"]);

        let alpha = table.get("alpha").unwrap();
        assert_eq!(alpha.steps[0].plugin, "message_filter");
        assert_eq!(alpha.steps[1].plugin, "mqtt_plugin");
        assert_eq!(alpha.steps[1].options["topic"], json!("mesh/rx"));

        let zeta = table.get("zeta").unwrap();
        assert_eq!(zeta.steps, vec![PipelineStep::bare("debugger")]);
    }

    #[test]
    fn test_multi_key_step_expands_in_order() {
        let yaml = r#"
p1:
  - debugger: {}
    drop: {}
  - passthrough:
"#;
        let table: PipelineTable = serde_yaml::from_str(yaml).unwrap();
        let plugins: Vec<&str> = table.get("p1").unwrap()
            .steps
            .iter()
            .map(|s| s.plugin.as_str())
            .collect();
        assert_eq!(plugins, vec!["debugger", "drop", "passthrough"]);
    }

    #[test]
    fn test_duplicate_pipeline_rejected() {
        let json = r#"{"p1": [], "p1": []}"#;
        let err = serde_json::from_str::<PipelineTable>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate pipeline name: p1"));
    }

    #[test]
    fn test_empty_pipeline_is_legal() {
        let table: PipelineTable = serde_yaml::from_str("p1: []\np2:\n").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("p1").unwrap().steps.is_empty());
        assert!(table.get("p2").unwrap().steps.is_empty());
    }

    #[test]
    fn test_push_rejects_duplicate() {
        let mut table = PipelineTable::new();
        assert!(table.push("p1", vec![]));
        assert!(!table.push("p1", vec![PipelineStep::bare("drop")]));
        assert!(table.get("p1").unwrap().steps.is_empty());
    }

    #[test]
    fn test_serialize_round_trip_keeps_order() {
        let table = PipelineTable::new()
            .with_pipeline("b", vec![PipelineStep::new("mqtt_plugin", json!({"name": "x"}))])
            .with_pipeline("a", vec![PipelineStep::bare("drop")]);
        let yaml = serde_yaml::to_string(&table).unwrap();
        let parsed: PipelineTable = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, table);
    }
}
