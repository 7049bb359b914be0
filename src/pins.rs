//! GPIO assignments for the switchboard relay board.
//!
//! Single source of truth — the registry, the relay bank, and the device
//! entry point all build from this table rather than hard-coding pin
//! numbers. Change a line here and it propagates everywhere.
//!
//! The symbolic names (`d0`…`d8`) are wire-compatible with the labels the
//! dashboard and provisioning tooling already use; the GPIO numbers are
//! the ESP32-S3 lines routed to the relay driver bank.

use crate::app::registry::OutputSpec;

/// Relay channel table, in board order. Registration order here is the
/// order state publications enumerate outputs in.
pub const OUTPUT_TABLE: &[OutputSpec] = &[
    OutputSpec { name: "d0", line: 4 },
    OutputSpec { name: "d1", line: 5 },
    OutputSpec { name: "d2", line: 6 },
    OutputSpec { name: "d3", line: 7 },
    OutputSpec { name: "d4", line: 15 },
    OutputSpec { name: "d5", line: 16 },
    OutputSpec { name: "d6", line: 17 },
    OutputSpec { name: "d7", line: 18 },
    OutputSpec { name: "d8", line: 8 },
];
