//! State snapshot encoding.
//!
//! The state topic carries one JSON object with a key per configured
//! output in registration order, values `"on"`/`"off"`. The snapshot is
//! built fresh per publication and is complete or not produced at all.

use serde_json::{Map, Value};

use super::registry::OutputRegistry;
use crate::error::SessionError;

/// Serialize the registry's current levels.
///
/// Identical registry state always yields identical bytes, which makes
/// repeated publication idempotent on the wire.
pub fn encode(registry: &OutputRegistry) -> Result<Vec<u8>, SessionError> {
    let mut doc = Map::new();
    for (name, level) in registry.snapshot() {
        let level = if level { "on" } else { "off" };
        doc.insert(name.to_owned(), Value::String(level.to_owned()));
    }
    serde_json::to_vec(&Value::Object(doc)).map_err(|_| SessionError::EncodeFailed)
}
