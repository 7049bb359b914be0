//! Reconnection supervisor — the agent's driving state machine.
//!
//! ```text
//! Disconnected ──connect ok──▶ ConnectedUnsubscribed ──subscribe ok──▶ Ready
//!      ▲  ▲                           │                                 │
//!      │  └───────── failure ◀────────┘                                 │
//!      └──────────────────── transport loss ◀───────────────────────────┘
//! ```
//!
//! Ticked once per control-loop iteration with the elapsed seconds since
//! the previous tick; backoff waits are counted down in ticks, so the
//! loop keeps running (watchdog feeds, Wi-Fi polling) while the session
//! waits out a retry delay. No wall-clock reads — the engine is fully
//! deterministic under test.
//!
//! On every (re)subscription exactly one unconditional state publication
//! follows, so a freshly connecting dashboard always learns the current
//! levels from the retained message without waiting for a change.

use log::{debug, info, warn};

use crate::app::ports::{RelayPort, SessionPort};
use crate::app::service::SwitchboardService;
use crate::config::AgentConfig;
use crate::error::Error;

/// Session lifecycle states, as observed between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport; possibly waiting out a retry delay.
    #[default]
    Disconnected,
    /// Connect attempt in flight. `connect()` is synchronous, so this is
    /// only ever observable from within a tick.
    Connecting,
    /// Transport up, control topic not yet subscribed.
    ConnectedUnsubscribed,
    /// Subscribed and announced; inbound commands flow.
    Ready,
}

pub struct ReconnectSupervisor {
    state: SessionState,
    /// Next retry delay in seconds; doubles per consecutive failure.
    backoff_secs: u32,
    /// Seconds left before the next connect attempt.
    wait_remaining: f32,
    min_backoff_secs: u32,
    max_backoff_secs: u32,
}

impl ReconnectSupervisor {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            backoff_secs: config.reconnect_min_secs,
            wait_remaining: 0.0,
            min_backoff_secs: config.reconnect_min_secs,
            max_backoff_secs: config.reconnect_max_secs,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the session by one control tick.
    pub fn tick(
        &mut self,
        elapsed_secs: f32,
        session: &mut impl SessionPort,
        relays: &mut impl RelayPort,
        service: &mut SwitchboardService,
    ) {
        match self.state {
            SessionState::Disconnected | SessionState::Connecting => {
                if self.wait_remaining > 0.0 {
                    self.wait_remaining -= elapsed_secs;
                    return;
                }
                self.attempt_connect(session);
            }

            SessionState::ConnectedUnsubscribed => {
                self.attempt_subscribe(session, service);
            }

            SessionState::Ready => {
                if !session.is_connected() {
                    warn!("supervisor: transport lost, reconnecting");
                    session.disconnect();
                    // A lost link is often momentary; restart from the
                    // floor delay rather than wherever backoff ended up.
                    self.backoff_secs = self.min_backoff_secs;
                    self.wait_remaining = self.backoff_secs as f32;
                    self.state = SessionState::Disconnected;
                    return;
                }

                // Drain first, handle after: handlers publish through
                // this same session, and must not re-enter poll().
                for msg in session.poll() {
                    if msg.topic != service.control_topic() {
                        continue;
                    }
                    match service.handle_payload(&msg.payload, relays, session) {
                        Ok(outcome) => {
                            debug!("supervisor: command ok ({} applied)", outcome.recognized);
                        }
                        Err(Error::Decode(e)) => warn!("supervisor: command dropped: {e}"),
                        Err(e) => warn!("supervisor: command handling failed: {e}"),
                    }
                }
            }
        }
    }

    fn attempt_connect(&mut self, session: &mut impl SessionPort) {
        self.state = SessionState::Connecting;
        match session.connect() {
            Ok(()) => {
                info!("supervisor: connected to broker");
                self.state = SessionState::ConnectedUnsubscribed;
            }
            Err(e) => {
                warn!("supervisor: connect failed ({e}), retrying in {}s", self.backoff_secs);
                self.state = SessionState::Disconnected;
                self.schedule_retry();
            }
        }
    }

    fn attempt_subscribe(
        &mut self,
        session: &mut impl SessionPort,
        service: &mut SwitchboardService,
    ) {
        match session.subscribe(service.control_topic()) {
            Ok(()) => {
                info!("supervisor: subscribed to '{}'", service.control_topic());
                self.state = SessionState::Ready;
                self.backoff_secs = self.min_backoff_secs;
                // Announce current state on every (re)subscription. A
                // failure here is not fatal: the registry is authoritative
                // and the next publication carries it.
                if let Err(e) = service.publish_state(session) {
                    warn!("supervisor: initial state publication failed: {e}");
                }
            }
            Err(e) => {
                warn!(
                    "supervisor: subscribe failed ({e}), retrying in {}s",
                    self.backoff_secs
                );
                session.disconnect();
                self.state = SessionState::Disconnected;
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.wait_remaining = self.backoff_secs as f32;
        self.backoff_secs = (self.backoff_secs * 2).min(self.max_backoff_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{InboundMessage, RelayPort, SessionPort};
    use crate::app::registry::{OutputRegistry, OutputSpec};
    use crate::error::SessionError;

    struct NullRelays;
    impl RelayPort for NullRelays {
        fn write_level(&mut self, _line: i32, _high: bool) {}
    }

    /// Scripted session for driving the supervisor through its states.
    #[derive(Default)]
    struct ScriptedSession {
        connected: bool,
        subscribed: Option<String>,
        connect_attempts: u32,
        fail_connects: Option<SessionError>,
        fail_subscribe: bool,
        inbound: Vec<InboundMessage>,
        published: Vec<Vec<u8>>,
    }

    impl SessionPort for ScriptedSession {
        fn connect(&mut self) -> Result<(), SessionError> {
            self.connect_attempts += 1;
            if let Some(e) = self.fail_connects {
                return Err(e);
            }
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self) {
            self.connected = false;
            self.subscribed = None;
        }
        fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
            if self.fail_subscribe {
                return Err(SessionError::SubscribeRejected);
            }
            self.subscribed = Some(topic.into());
            Ok(())
        }
        fn publish(
            &mut self,
            _topic: &str,
            payload: &[u8],
            _retain: bool,
        ) -> Result<(), SessionError> {
            if !self.connected {
                return Err(SessionError::NotConnected);
            }
            self.published.push(payload.to_vec());
            Ok(())
        }
        fn poll(&mut self) -> Vec<InboundMessage> {
            core::mem::take(&mut self.inbound)
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn fixtures() -> (AgentConfig, SwitchboardService, NullRelays) {
        let config = AgentConfig {
            broker_host: "broker.local".into(),
            username: "sb".into(),
            password: "sb-password".into(),
            wifi_ssid: "net".into(),
            ..Default::default()
        };
        let mut relays = NullRelays;
        let table = &[
            OutputSpec { name: "d0", line: 4 },
            OutputSpec { name: "d1", line: 5 },
        ];
        let registry = OutputRegistry::from_table(table, &mut relays).unwrap();
        let service = SwitchboardService::new(registry, &config);
        (config, service, relays)
    }

    #[test]
    fn reaches_ready_and_announces_state_once() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession::default();
        let mut sup = ReconnectSupervisor::new(&config);

        sup.tick(0.1, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::ConnectedUnsubscribed);
        sup.tick(0.1, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::Ready);
        assert_eq!(session.subscribed.as_deref(), Some("appliances/switchboard/control"));
        assert_eq!(session.published.len(), 1);
        assert_eq!(session.published[0], br#"{"d0":"off","d1":"off"}"#);
    }

    #[test]
    fn backoff_doubles_to_cap_and_waits_between_attempts() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession {
            fail_connects: Some(SessionError::NetworkUnreachable),
            ..Default::default()
        };
        let mut sup = ReconnectSupervisor::new(&config);

        // First attempt is immediate; then 2s, 4s, 8s ... cap 60s.
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(session.connect_attempts, 1);

        // 1s of the 2s delay elapsed — no new attempt yet.
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(session.connect_attempts, 1);
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        // Delay exhausted on this tick; attempt fires on the next.
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(session.connect_attempts, 2);

        // Burn through many failures; the delay must never exceed the cap.
        for _ in 0..500 {
            sup.tick(1.0, &mut session, &mut relays, &mut service);
        }
        assert!(sup.backoff_secs <= config.reconnect_max_secs);
        assert_eq!(sup.backoff_secs, config.reconnect_max_secs);
    }

    #[test]
    fn auth_rejection_is_distinct_but_still_retried() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession {
            fail_connects: Some(SessionError::AuthRejected),
            ..Default::default()
        };
        let mut sup = ReconnectSupervisor::new(&config);

        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::Disconnected);

        // Retryable: clearing the fault lets the session come up.
        session.fail_connects = None;
        for _ in 0..10 {
            sup.tick(1.0, &mut session, &mut relays, &mut service);
        }
        assert_eq!(sup.state(), SessionState::Ready);
    }

    #[test]
    fn subscribe_failure_tears_down_and_retries() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession {
            fail_subscribe: true,
            ..Default::default()
        };
        let mut sup = ReconnectSupervisor::new(&config);

        sup.tick(1.0, &mut session, &mut relays, &mut service);
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::Disconnected);
        assert!(!session.connected);

        session.fail_subscribe = false;
        for _ in 0..10 {
            sup.tick(1.0, &mut session, &mut relays, &mut service);
        }
        assert_eq!(sup.state(), SessionState::Ready);
    }

    #[test]
    fn transport_loss_returns_to_disconnected_then_recovers() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession::default();
        let mut sup = ReconnectSupervisor::new(&config);

        sup.tick(1.0, &mut session, &mut relays, &mut service);
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::Ready);

        // Outage: registry mutates while the announcement cannot go out.
        session.connected = false;
        sup.tick(1.0, &mut session, &mut relays, &mut service);
        assert_eq!(sup.state(), SessionState::Disconnected);

        service
            .handle_payload(br#"{"d1":"on"}"#, &mut relays, &mut session)
            .unwrap();
        assert!(session.published.len() == 1, "publish must fail during outage");

        // Recovery republishes exactly once, reflecting the outage-time
        // mutation rather than the pre-disconnect snapshot.
        for _ in 0..10 {
            sup.tick(1.0, &mut session, &mut relays, &mut service);
        }
        assert_eq!(sup.state(), SessionState::Ready);
        assert_eq!(session.published.len(), 2);
        assert_eq!(session.published[1], br#"{"d0":"off","d1":"on"}"#);
    }

    #[test]
    fn ready_dispatches_inbound_to_service() {
        let (config, mut service, mut relays) = fixtures();
        let mut session = ScriptedSession::default();
        let mut sup = ReconnectSupervisor::new(&config);

        sup.tick(1.0, &mut session, &mut relays, &mut service);
        sup.tick(1.0, &mut session, &mut relays, &mut service);

        session.inbound.push(InboundMessage {
            topic: "appliances/switchboard/control".into(),
            payload: br#"{"d0":"on"}"#.to_vec(),
        });
        sup.tick(1.0, &mut session, &mut relays, &mut service);

        assert_eq!(service.registry().get("d0"), Some(true));
        assert_eq!(session.published.len(), 2);
        assert_eq!(session.published[1], br#"{"d0":"on","d1":"off"}"#);
    }
}
