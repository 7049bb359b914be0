//! Integration tests: supervisor → session → service → registry → relays,
//! driven end-to-end against the simulation adapters.

#![cfg(not(target_os = "espidf"))]

use switchboard::adapters::mqtt::MqttSession;
use switchboard::adapters::relays::RelayBank;
use switchboard::app::ports::SessionPort;
use switchboard::app::registry::{OutputRegistry, OutputSpec};
use switchboard::app::service::SwitchboardService;
use switchboard::config::AgentConfig;
use switchboard::error::SessionError;
use switchboard::supervisor::{ReconnectSupervisor, SessionState};

const TABLE: &[OutputSpec] = &[
    OutputSpec { name: "d0", line: 4 },
    OutputSpec { name: "d1", line: 5 },
];

const CONTROL: &str = "appliances/switchboard/control";

struct Rig {
    config: AgentConfig,
    relays: RelayBank,
    service: SwitchboardService,
    session: MqttSession,
    supervisor: ReconnectSupervisor,
}

fn rig() -> Rig {
    let config = AgentConfig {
        broker_host: "192.168.1.4".into(),
        username: "appliances".into(),
        password: "sb-password".into(),
        wifi_ssid: "WorkshopNet".into(),
        wifi_password: "workshop-pass".into(),
        ..Default::default()
    };
    config.validate().expect("rig config must be valid");

    let mut relays = RelayBank::new(TABLE).unwrap();
    let registry = OutputRegistry::from_table(TABLE, &mut relays).unwrap();
    let service = SwitchboardService::new(registry, &config);
    let session = MqttSession::new(&config);
    let supervisor = ReconnectSupervisor::new(&config);

    Rig {
        config,
        relays,
        service,
        session,
        supervisor,
    }
}

impl Rig {
    fn tick(&mut self, secs: f32) {
        self.supervisor
            .tick(secs, &mut self.session, &mut self.relays, &mut self.service);
    }

    /// Drive from boot to Ready (connect tick + subscribe tick).
    fn bring_up(&mut self) {
        self.tick(0.1);
        self.tick(0.1);
        assert_eq!(self.supervisor.state(), SessionState::Ready);
    }
}

#[test]
fn boot_announces_all_off_retained() {
    let mut rig = rig();
    rig.bring_up();

    let published = rig.session.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, rig.config.state_topic);
    assert_eq!(published[0].payload, br#"{"d0":"off","d1":"off"}"#);
    assert!(published[0].retain, "state must be retained for late joiners");
}

#[test]
fn command_flows_to_relays_and_state_topic() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, br#"{"d0":"on"}"#);
    rig.tick(0.1);

    assert_eq!(rig.service.registry().get("d0"), Some(true));
    assert_eq!(rig.service.registry().get("d1"), Some(false));
    // GPIO 4 is d0's line in the test table.
    assert_eq!(rig.relays.level_of(4), Some(true));

    let published = rig.session.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].payload, br#"{"d0":"on","d1":"off"}"#);
}

#[test]
fn unknown_name_changes_nothing_but_still_announces() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, br#"{"zz":"on"}"#);
    rig.tick(0.1);

    assert_eq!(rig.service.registry().get("d0"), Some(false));
    assert_eq!(rig.service.registry().get("d1"), Some(false));
    assert_eq!(rig.session.published().len(), 2);
    assert_eq!(rig.session.published()[1].payload, br#"{"d0":"off","d1":"off"}"#);
}

#[test]
fn malformed_payloads_mutate_nothing_and_publish_nothing() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, b"not-json");
    rig.session.inject_inbound(CONTROL, b"[]");
    rig.tick(0.1);

    assert_eq!(rig.service.registry().get("d0"), Some(false));
    assert!(rig.relays.history().iter().all(|&(_, high)| !high));
    // Only the boot announcement exists.
    assert_eq!(rig.session.published().len(), 1);
}

#[test]
fn identical_commands_are_idempotent_on_the_wire() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, br#"{"d0":"on","d1":"off"}"#);
    rig.tick(0.1);
    rig.session.inject_inbound(CONTROL, br#"{"d0":"on","d1":"off"}"#);
    rig.tick(0.1);

    let published = rig.session.published();
    assert_eq!(published.len(), 3);
    assert_eq!(published[1].payload, published[2].payload);
    assert_eq!(rig.service.registry().get("d0"), Some(true));
}

#[test]
fn permissive_value_policy_round_trip() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, br#"{"d1":"ON"}"#);
    rig.tick(0.1);
    assert_eq!(rig.service.registry().get("d1"), Some(true));

    rig.session.inject_inbound(CONTROL, br#"{"d1":"anything-else"}"#);
    rig.tick(0.1);
    assert_eq!(rig.service.registry().get("d1"), Some(false));
}

#[test]
fn case_insensitive_names_hit_the_same_output() {
    let mut rig = rig();
    rig.bring_up();

    rig.session.inject_inbound(CONTROL, br#"{"D0":"on"}"#);
    rig.tick(0.1);
    assert_eq!(rig.service.registry().get("d0"), Some(true));
    assert_eq!(rig.relays.level_of(4), Some(true));
}

#[test]
fn reconnect_announces_outage_time_state_exactly_once() {
    let mut rig = rig();
    rig.bring_up();

    // Jammed egress first: a command applies but cannot announce.
    rig.session.set_reject_publishes(true);
    rig.session.inject_inbound(CONTROL, br#"{"d1":"on"}"#);
    rig.tick(0.1);
    assert_eq!(rig.service.registry().get("d1"), Some(true));
    assert_eq!(rig.session.published().len(), 1, "announce failed during jam");
    rig.session.set_reject_publishes(false);

    // Then the transport drops entirely.
    rig.session.drop_link();
    rig.tick(0.1);
    assert_eq!(rig.supervisor.state(), SessionState::Disconnected);

    // The supervisor waits out the floor delay, reconnects, resubscribes,
    // and announces current (not pre-outage) state exactly once.
    let attempts_before = rig.session.connect_attempts();
    for _ in 0..40 {
        rig.tick(0.1);
    }
    assert_eq!(rig.supervisor.state(), SessionState::Ready);
    assert_eq!(rig.session.connect_attempts(), attempts_before + 1);

    let published = rig.session.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].payload, br#"{"d0":"off","d1":"on"}"#);
    assert!(published[1].retain);
}

#[test]
fn connect_failures_back_off_before_retrying() {
    let mut rig = rig();

    rig.session.fail_next_connect(SessionError::NetworkUnreachable);
    rig.tick(0.1);
    assert_eq!(rig.supervisor.state(), SessionState::Disconnected);
    assert_eq!(rig.session.connect_attempts(), 1);

    // Inside the 2s floor delay nothing fires.
    for _ in 0..10 {
        rig.tick(0.1);
    }
    assert_eq!(rig.session.connect_attempts(), 1);

    // Past the delay the retry fires and succeeds.
    for _ in 0..12 {
        rig.tick(0.1);
    }
    assert!(rig.session.connect_attempts() >= 2);
    rig.tick(0.1);
    assert_eq!(rig.supervisor.state(), SessionState::Ready);
}

#[test]
fn auth_rejection_is_retryable_with_backoff() {
    let mut rig = rig();

    rig.session.fail_next_connect(SessionError::AuthRejected);
    rig.tick(0.1);
    assert_eq!(rig.supervisor.state(), SessionState::Disconnected);

    for _ in 0..30 {
        rig.tick(0.1);
    }
    assert_eq!(rig.supervisor.state(), SessionState::Ready);
}

#[test]
fn oversized_state_payload_is_rejected_typed() {
    // Twelve outputs with 16-byte names encode to ~300 bytes of state,
    // past the 256-byte message buffer; the publish must fail typed,
    // never truncate.
    let table: &[OutputSpec] = &[
        OutputSpec { name: "workbench-lamp-0", line: 1 },
        OutputSpec { name: "workbench-lamp-1", line: 2 },
        OutputSpec { name: "workbench-lamp-2", line: 3 },
        OutputSpec { name: "workbench-lamp-3", line: 4 },
        OutputSpec { name: "workbench-lamp-4", line: 5 },
        OutputSpec { name: "workbench-lamp-5", line: 6 },
        OutputSpec { name: "workbench-lamp-6", line: 7 },
        OutputSpec { name: "workbench-lamp-7", line: 8 },
        OutputSpec { name: "workbench-lamp-8", line: 9 },
        OutputSpec { name: "workbench-lamp-9", line: 10 },
        OutputSpec { name: "workbench-lamp-a", line: 11 },
        OutputSpec { name: "workbench-lamp-b", line: 12 },
    ];
    let config = AgentConfig {
        broker_host: "192.168.1.4".into(),
        username: "appliances".into(),
        password: "sb-password".into(),
        wifi_ssid: "WorkshopNet".into(),
        ..Default::default()
    };
    let mut relays = RelayBank::new(table).unwrap();
    let registry = OutputRegistry::from_table(table, &mut relays).unwrap();
    let service = SwitchboardService::new(registry, &config);
    let mut session = MqttSession::new(&config);
    session.connect().unwrap();

    match service.publish_state(&mut session) {
        Err(SessionError::PayloadTooLarge(n)) => assert!(n > 256),
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
    assert!(session.published().is_empty());
}
