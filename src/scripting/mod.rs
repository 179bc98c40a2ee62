//! Rhai scripting for the `script` plugin
//!
//! A script sees the current packet as `packet`: an object map for JSON
//! packets, a string for raw text. The value the script evaluates to decides
//! what happens next:
//!
//! - a map replaces the packet
//! - a string becomes a text packet
//! - `true` keeps the packet unchanged
//! - `false` or `()` drops it
//!
//! ## Functions
//!
//! - `print(..)` / `debug(..)` - Write to the bridge log
//! - `distance_km(lat1, lng1, lat2, lng2)` - Great-circle distance in kilometres
//!
//! ## Example Scripts
//!
//! Only forward text messages:
//! ```rhai
//! packet.decoded?.portnum == "TEXT_MESSAGE_APP"
//! ```
//!
//! Tag a packet before publishing:
//! ```rhai
//! packet.bridge = "meshbridge";
//! packet
//! ```

mod engine;

pub use engine::ScriptEngine;

use crate::error::{BridgeError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled script ready to run
#[derive(Clone)]
pub struct CompiledScript {
    ast: AST,
    source: String,
}

impl CompiledScript {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("source", &self.source)
            .finish()
    }
}

/// Compiled scripts keyed by source text
#[derive(Default)]
pub struct ScriptCache {
    cache: HashMap<String, CompiledScript>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledScript> {
        if let Some(script) = self.cache.get(source) {
            return Ok(script.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| BridgeError::Script(format!("Compilation error: {}", e)))?;
        let script = CompiledScript {
            ast,
            source: source.to_string(),
        };
        self.cache.insert(source.to_string(), script.clone());
        Ok(script)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;
