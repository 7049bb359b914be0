//! Relay bank adapter.
//!
//! Implements [`RelayPort`] over the GPIO lines named in the pin table.
//! On `espidf` each line is claimed once as a push-pull output and held
//! for the process lifetime; on host targets writes are recorded so
//! tests can assert on levels and full write history.

use log::{info, warn};

use crate::app::ports::RelayPort;
use crate::app::registry::OutputSpec;
use crate::error::Error;

#[cfg(target_os = "espidf")]
use embedded_hal::digital::OutputPin;
#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

pub struct RelayBank {
    #[cfg(target_os = "espidf")]
    lines: Vec<(i32, PinDriver<'static, AnyOutputPin, Output>)>,

    #[cfg(not(target_os = "espidf"))]
    levels: Vec<(i32, bool)>,
    #[cfg(not(target_os = "espidf"))]
    history: Vec<(i32, bool)>,
}

impl RelayBank {
    /// Claim every line in `table` as an output.
    pub fn new(table: &[OutputSpec]) -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            let mut lines = Vec::with_capacity(table.len());
            for spec in table {
                // SAFETY: each GPIO appears once in the pin table and is
                // claimed exactly once here, before the control loop runs.
                let pin = unsafe { AnyOutputPin::new(spec.line) };
                let driver = PinDriver::output(pin)
                    .map_err(|_| Error::Config("failed to claim relay GPIO"))?;
                lines.push((spec.line, driver));
            }
            info!("relays: {} lines claimed", lines.len());
            Ok(Self { lines })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("relays: simulation backend ({} lines)", table.len());
            Ok(Self {
                levels: table.iter().map(|s| (s.line, false)).collect(),
                history: Vec::new(),
            })
        }
    }

    // ── Test hooks (host only) ────────────────────────────────

    /// Last written level of `line`, if the line exists.
    #[cfg(not(target_os = "espidf"))]
    pub fn level_of(&self, line: i32) -> Option<bool> {
        self.levels.iter().find(|(l, _)| *l == line).map(|(_, v)| *v)
    }

    /// Every write in order, for ordering assertions.
    #[cfg(not(target_os = "espidf"))]
    pub fn history(&self) -> &[(i32, bool)] {
        &self.history
    }
}

impl RelayPort for RelayBank {
    fn write_level(&mut self, line: i32, high: bool) {
        #[cfg(target_os = "espidf")]
        {
            match self.lines.iter_mut().find(|(l, _)| *l == line) {
                Some((_, driver)) => {
                    let result = if high { driver.set_high() } else { driver.set_low() };
                    if result.is_err() {
                        // Unreachable on a claimed push-pull output; keep
                        // the diagnostic in case wiring assumptions change.
                        warn!("relays: write to GPIO {line} failed");
                    }
                }
                None => warn!("relays: write to unclaimed GPIO {line} ignored"),
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            match self.levels.iter_mut().find(|(l, _)| *l == line) {
                Some((_, level)) => {
                    *level = high;
                    self.history.push((line, high));
                }
                None => warn!("relays: write to unclaimed GPIO {line} ignored"),
            }
        }
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    const TABLE: &[OutputSpec] = &[
        OutputSpec { name: "d0", line: 4 },
        OutputSpec { name: "d1", line: 5 },
    ];

    #[test]
    fn writes_are_recorded_per_line() {
        let mut bank = RelayBank::new(TABLE).unwrap();
        bank.write_level(4, true);
        bank.write_level(5, false);
        bank.write_level(4, false);
        assert_eq!(bank.level_of(4), Some(false));
        assert_eq!(bank.level_of(5), Some(false));
        assert_eq!(bank.history(), [(4, true), (5, false), (4, false)]);
    }

    #[test]
    fn unclaimed_line_is_ignored() {
        let mut bank = RelayBank::new(TABLE).unwrap();
        bank.write_level(99, true);
        assert_eq!(bank.level_of(99), None);
        assert!(bank.history().is_empty());
    }
}
