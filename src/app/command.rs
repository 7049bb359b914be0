//! Inbound command decoding and application.
//!
//! A command is a JSON object mapping output names to level strings:
//! `{"d0":"on","d3":"off"}`. Names match case-insensitively; unknown
//! names are skipped, not errors. The value `"on"` (any case) means
//! high; **every other value means low** — the dashboard has always sent
//! free-form strings here and observers rely on the permissive reading,
//! so do not tighten it.

use serde_json::Value;

use super::ports::RelayPort;
use super::registry::OutputRegistry;
use crate::error::DecodeError;

/// What a successfully decoded command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Entries that named a configured output and were applied.
    pub recognized: usize,
}

/// Decode `payload` and apply it to the registry in document order.
///
/// Malformed payloads are rejected wholesale: on any `Err` no output has
/// been touched. Later entries for the same output override earlier
/// ones. Non-string values read as "not `on`", i.e. low.
pub fn apply(
    payload: &[u8],
    registry: &mut OutputRegistry,
    relays: &mut impl RelayPort,
) -> Result<CommandOutcome, DecodeError> {
    let doc: Value = serde_json::from_slice(payload).map_err(|_| DecodeError::InvalidJson)?;
    let entries = doc.as_object().ok_or(DecodeError::NotAnObject)?;

    let mut recognized = 0;
    for (name, value) in entries {
        let high = value
            .as_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("on"));
        if registry.set(name, high, relays) {
            recognized += 1;
        }
    }

    Ok(CommandOutcome { recognized })
}
