//! Rhai engine configured for packet scripts.

use crate::error::{BridgeError, Result};
use crate::pipeline::packet::Packet;
use crate::pipeline::plugins::location_filter::haversine_km;
use crate::scripting::{CompiledScript, ScriptCache, SharedScriptCache};
use crate::types::Position;
use rhai::{Dynamic, Engine, Scope};
use std::sync::{Arc, RwLock};

/// Name the packet is bound to inside a script
pub const PACKET_VAR: &str = "packet";

/// The script engine used by the `script` plugin
pub struct ScriptEngine {
    engine: Engine,
    cache: SharedScriptCache,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(RwLock::new(ScriptCache::new())))
    }

    /// Create a script engine with a shared cache
    pub fn with_cache(cache: SharedScriptCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine, cache }
    }

    /// Safety limits, log hooks and helper functions
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(50_000);
        engine.set_max_string_size(65_536);
        engine.set_max_array_size(4_096);
        engine.set_max_map_size(1_000);

        engine.on_print(|text| tracing::info!("script: {}", text));
        engine.on_debug(|text, source, pos| match source {
            Some(source) => tracing::debug!("script {} @ {:?}: {}", source, pos, text),
            None => tracing::debug!("script @ {:?}: {}", pos, text),
        });

        engine.register_fn(
            "distance_km",
            |lat1: f64, lng1: f64, lat2: f64, lng2: f64| -> f64 {
                haversine_km(
                    Position {
                        latitude: lat1,
                        longitude: lng1,
                    },
                    Position {
                        latitude: lat2,
                        longitude: lng2,
                    },
                )
            },
        );
    }

    /// Compile a script and cache it
    pub fn compile(&self, source: &str) -> Result<CompiledScript> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| BridgeError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.get_or_compile(&self.engine, source)
    }

    /// Run a compiled script against `packet`.
    ///
    /// Returns `Ok(None)` when the script asks for the packet to be dropped.
    pub fn run(&self, script: &CompiledScript, packet: &Packet) -> Result<Option<Packet>> {
        let bound = match packet {
            Packet::Json(value) => rhai::serde::to_dynamic(value)
                .map_err(|e| BridgeError::Script(format!("Cannot bind packet: {}", e)))?,
            Packet::Text(text) => Dynamic::from(text.clone()),
        };

        let mut scope = Scope::new();
        scope.push_dynamic(PACKET_VAR, bound);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, script.ast())
            .map_err(|e| BridgeError::Script(format!("Execution error: {}", e)))?;

        Self::into_packet(result, packet)
    }

    /// Compile and run in one step
    pub fn eval(&self, source: &str, packet: &Packet) -> Result<Option<Packet>> {
        let script = self.compile(source)?;
        self.run(&script, packet)
    }

    pub fn cache(&self) -> &SharedScriptCache {
        &self.cache
    }

    fn into_packet(result: Dynamic, original: &Packet) -> Result<Option<Packet>> {
        if result.is_unit() {
            return Ok(None);
        }
        if let Ok(keep) = result.as_bool() {
            return Ok(keep.then(|| original.clone()));
        }
        if result.is_string() {
            let text = result
                .into_string()
                .map_err(|t| BridgeError::Script(format!("Unexpected {} result", t)))?;
            return Ok(Some(Packet::Text(text)));
        }
        if result.is_map() {
            let value: serde_json::Value = rhai::serde::from_dynamic(&result)
                .map_err(|e| BridgeError::Script(format!("Cannot convert result: {}", e)))?;
            return Ok(Some(Packet::Json(value)));
        }
        Err(BridgeError::Script(format!(
            "Script must return a map, string, bool or (), got {}",
            result.type_name()
        )))
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn position_report() -> Packet {
        Packet::from(json!({
            "id": 10,
            "decoded": {
                "portnum": "POSITION_APP",
                "position": { "latitude": 51.5, "longitude": -0.12 }
            }
        }))
    }

    #[test]
    fn test_unit_and_false_drop() {
        let engine = ScriptEngine::new();
        let pkt = position_report();
        assert_eq!(engine.eval("()", &pkt).unwrap(), None);
        assert_eq!(engine.eval("false", &pkt).unwrap(), None);
    }

    #[test]
    fn test_true_keeps_packet() {
        let engine = ScriptEngine::new();
        let pkt = position_report();
        let out = engine
            .eval(r#"packet.decoded.portnum == "POSITION_APP""#, &pkt)
            .unwrap();
        assert_eq!(out, Some(pkt));
    }

    #[test]
    fn test_map_replaces_packet() {
        let engine = ScriptEngine::new();
        let out = engine
            .eval(r#"packet.tag = "seen"; packet"#, &position_report())
            .unwrap()
            .unwrap();
        assert_eq!(out.str_field(&["tag"]), Some("seen"));
        assert_eq!(out.id(), Some(10));
    }

    #[test]
    fn test_string_result_is_text() {
        let engine = ScriptEngine::new();
        let out = engine
            .eval(r#"`from ${packet}`"#, &Packet::from("mqtt"))
            .unwrap();
        assert_eq!(out, Some(Packet::from("from mqtt")));
    }

    #[test]
    fn test_distance_function() {
        let engine = ScriptEngine::new();
        let out = engine
            .eval(
                "let p = packet.decoded.position; \
                 distance_km(p.latitude, p.longitude, 51.5, -0.12) < 1.0",
                &position_report(),
            )
            .unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn test_bad_results_are_errors() {
        let engine = ScriptEngine::new();
        assert!(engine.eval("42", &position_report()).is_err());
        assert!(engine.eval("let x = ;", &position_report()).is_err());
    }

    #[test]
    fn test_runaway_script_is_stopped() {
        let engine = ScriptEngine::new();
        let err = engine.eval("loop {}", &position_report()).unwrap_err();
        assert!(matches!(err, BridgeError::Script(_)));
    }

    #[test]
    fn test_caching() {
        let engine = ScriptEngine::new();
        engine.compile("true").unwrap();
        engine.compile("true").unwrap();
        assert_eq!(engine.cache().read().unwrap().len(), 1);
    }
}
