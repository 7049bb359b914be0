//! Switchboard service — the hexagonal core.
//!
//! Owns the output registry and the topic names, and enforces the one
//! ordering rule of the hot path: inbound command → registry mutation →
//! state publication. All I/O flows through port traits injected at
//! call sites, making the whole service testable with mock adapters.
//!
//! ```text
//!  SessionPort.poll ──▶ ┌─────────────────────────┐ ──▶ SessionPort.publish
//!                       │   SwitchboardService     │
//!       RelayPort  ◀────│  decode · apply · encode │
//!                       └─────────────────────────┘
//! ```

use log::{debug, warn};

use super::command::{self, CommandOutcome};
use super::ports::{RelayPort, SessionPort};
use super::registry::OutputRegistry;
use super::state;
use crate::config::AgentConfig;
use crate::error::{Error, SessionError};

pub struct SwitchboardService {
    registry: OutputRegistry,
    control_topic: String,
    state_topic: String,
    commands_handled: u64,
}

impl SwitchboardService {
    pub fn new(registry: OutputRegistry, config: &AgentConfig) -> Self {
        Self {
            registry,
            control_topic: config.control_topic.clone(),
            state_topic: config.state_topic.clone(),
            commands_handled: 0,
        }
    }

    /// Topic the supervisor subscribes on.
    pub fn control_topic(&self) -> &str {
        &self.control_topic
    }

    /// Decode one inbound payload, apply it, and publish the resulting
    /// state.
    ///
    /// A decode failure drops the command wholesale: no mutation, no
    /// publication. A *publish* failure after a successful decode is
    /// logged and swallowed — the registry keeps the new state and the
    /// next successful publication carries it, so observers converge.
    pub fn handle_payload(
        &mut self,
        payload: &[u8],
        relays: &mut impl RelayPort,
        session: &mut impl SessionPort,
    ) -> Result<CommandOutcome, Error> {
        let outcome = command::apply(payload, &mut self.registry, relays)?;
        self.commands_handled += 1;
        debug!(
            "command applied: {} of registry's {} outputs addressed",
            outcome.recognized,
            self.registry.len()
        );

        // Unconditional, even for a no-op command: the state topic must
        // always reflect the latest command result.
        if let Err(e) = self.publish_state(session) {
            warn!("state publication failed after command: {e}");
        }
        Ok(outcome)
    }

    /// Publish the full state snapshot, retained.
    pub fn publish_state(&self, session: &mut impl SessionPort) -> Result<(), SessionError> {
        let payload = state::encode(&self.registry)?;
        session.publish(&self.state_topic, &payload, true)?;
        debug!("state published ({} bytes)", payload.len());
        Ok(())
    }

    /// Read access for queries and tests.
    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// Total successfully decoded commands since boot.
    pub fn commands_handled(&self) -> u64 {
        self.commands_handled
    }
}
