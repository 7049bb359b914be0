//! Output registry — symbolic names to physical relay lines.
//!
//! Built once at boot from the table in [`crate::pins`], mutated only by
//! the command handler, never resized afterwards. Lookup is
//! case-insensitive; enumeration order is registration order, so
//! serialized state is deterministic and diffable in tests.

use heapless::Vec;
use log::info;

use super::ports::RelayPort;
use crate::error::Error;

/// Maximum number of relay channels (stack-allocated registry).
pub const MAX_OUTPUTS: usize = 16;

/// Longest accepted output name.
const NAME_CAP: usize = 16;

/// One row of the boot-time configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    /// Symbolic name, matched case-insensitively against commands.
    pub name: &'static str,
    /// GPIO line driving the relay.
    pub line: i32,
}

/// A named binary output and its last commanded level.
#[derive(Debug, Clone)]
struct Output {
    name: heapless::String<NAME_CAP>,
    line: i32,
    level: bool,
}

/// Fixed table of named outputs. The `line` of an output never changes
/// after construction; `level` is mutated only through [`set`].
///
/// [`set`]: OutputRegistry::set
pub struct OutputRegistry {
    outputs: Vec<Output, MAX_OUTPUTS>,
}

impl OutputRegistry {
    /// Build the registry from a configuration table and drive every
    /// line low.
    ///
    /// Rejects duplicate names (case-insensitive), over-long names, and
    /// tables beyond [`MAX_OUTPUTS`] — all of these are wiring-table
    /// mistakes, caught at boot rather than at command time.
    pub fn from_table(table: &[OutputSpec], relays: &mut impl RelayPort) -> Result<Self, Error> {
        let mut outputs: Vec<Output, MAX_OUTPUTS> = Vec::new();

        for spec in table {
            if outputs
                .iter()
                .any(|o| o.name.eq_ignore_ascii_case(spec.name))
            {
                return Err(Error::Config("duplicate output name in pin table"));
            }
            let mut name = heapless::String::new();
            name.push_str(spec.name)
                .map_err(|()| Error::Config("output name too long"))?;
            outputs
                .push(Output {
                    name,
                    line: spec.line,
                    level: false,
                })
                .map_err(|_| Error::Config("too many outputs in pin table"))?;
        }

        // Known-safe initial state: everything off.
        for o in &outputs {
            relays.write_level(o.line, false);
        }

        info!("registry: {} outputs configured", outputs.len());
        Ok(Self { outputs })
    }

    /// Set `name` to `level`, driving the physical line synchronously.
    /// Returns whether a matching output existed and was updated.
    pub fn set(&mut self, name: &str, level: bool, relays: &mut impl RelayPort) -> bool {
        match self
            .outputs
            .iter_mut()
            .find(|o| o.name.eq_ignore_ascii_case(name))
        {
            Some(o) => {
                o.level = level;
                relays.write_level(o.line, level);
                true
            }
            None => false,
        }
    }

    /// Current level of `name`, or `None` if not configured.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.outputs
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .map(|o| o.level)
    }

    /// Every `(name, level)` pair in registration order.
    pub fn snapshot(&self) -> impl Iterator<Item = (&str, bool)> {
        self.outputs.iter().map(|o| (o.name.as_str(), o.level))
    }

    /// Number of configured outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
