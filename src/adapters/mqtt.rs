//! MQTT session adapter.
//!
//! Implements [`SessionPort`] — one live connection to one broker with
//! stored parameters, explicit `poll()` delivery, and a bounded inbound
//! queue.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`.
//!   The client's event callback feeds the inbound queue and maintains
//!   the online flag; `poll()` only drains the queue, so delivery order
//!   and the non-blocking contract are owned here, not inside the
//!   library's dispatch.
//! - **all other targets**: a deterministic scripted broker for the test
//!   suite — inject inbound frames, record publishes, fail the next
//!   connect/subscribe/publish, drop the link.

use log::{info, warn};

use crate::app::ports::{InboundMessage, MAX_PAYLOAD_BYTES, SessionPort};
use crate::config::AgentConfig;
use crate::error::SessionError;

#[cfg(target_os = "espidf")]
use std::collections::VecDeque;
#[cfg(target_os = "espidf")]
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
#[cfg(target_os = "espidf")]
use std::sync::{Arc, Mutex};

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

/// Pending inbound frames kept between polls. The control loop drains
/// every tick; more than a handful pending means the loop is stalled,
/// and the oldest frames are the ones a later command supersedes.
const INBOUND_QUEUE_CAP: usize = 8;

/// MQTT keep-alive interval.
#[cfg(target_os = "espidf")]
const KEEP_ALIVE_SECS: u64 = 15;

/// How long `connect()` waits for the broker's CONNACK.
#[cfg(target_os = "espidf")]
const CONNECT_TIMEOUT_MS: u32 = 10_000;

/// Broker identity, copied out of [`AgentConfig`] at construction so the
/// session owns everything it needs to reconnect.
#[derive(Debug, Clone)]
struct BrokerParams {
    host: String,
    port: u16,
    client_id: String,
    username: String,
    password: String,
}

pub struct MqttSession {
    params: BrokerParams,
    subscribed: Option<String>,

    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    online: Arc<AtomicBool>,
    #[cfg(target_os = "espidf")]
    connect_fault: Arc<AtomicU8>,
    #[cfg(target_os = "espidf")]
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,

    #[cfg(not(target_os = "espidf"))]
    sim: SimBroker,
}

impl MqttSession {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            params: BrokerParams {
                host: config.broker_host.clone(),
                port: config.broker_port,
                client_id: config.client_id.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
            subscribed: None,

            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(target_os = "espidf")]
            online: Arc::new(AtomicBool::new(false)),
            #[cfg(target_os = "espidf")]
            connect_fault: Arc::new(AtomicU8::new(0)),
            #[cfg(target_os = "espidf")]
            inbound: Arc::new(Mutex::new(VecDeque::new())),

            #[cfg(not(target_os = "espidf"))]
            sim: SimBroker::default(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Platform: ESP-IDF
// ───────────────────────────────────────────────────────────────

// Fault codes reported by the event callback to the connect path.
#[cfg(target_os = "espidf")]
const FAULT_NONE: u8 = 0;
#[cfg(target_os = "espidf")]
const FAULT_AUTH: u8 = 1;

#[cfg(target_os = "espidf")]
impl MqttSession {
    fn platform_connect(&mut self) -> Result<(), SessionError> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        let url = format!("mqtt://{}:{}", self.params.host, self.params.port);
        let conf = MqttClientConfiguration {
            client_id: Some(&self.params.client_id),
            username: Some(&self.params.username),
            password: Some(&self.params.password),
            keep_alive_interval: Some(core::time::Duration::from_secs(KEEP_ALIVE_SECS)),
            ..Default::default()
        };

        let online = Arc::clone(&self.online);
        let fault = Arc::clone(&self.connect_fault);
        let inbound = Arc::clone(&self.inbound);
        online.store(false, Ordering::Release);
        fault.store(FAULT_NONE, Ordering::Release);

        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                fault.store(FAULT_NONE, Ordering::Release);
                online.store(true, Ordering::Release);
            }
            EventPayload::Disconnected => {
                online.store(false, Ordering::Release);
            }
            EventPayload::Received { topic, data, .. } => {
                if data.len() > MAX_PAYLOAD_BYTES {
                    warn!("mqtt: dropping oversized frame ({} bytes)", data.len());
                    return;
                }
                let Some(topic) = topic else { return };
                if let Ok(mut queue) = inbound.lock() {
                    if queue.len() >= INBOUND_QUEUE_CAP {
                        warn!("mqtt: inbound queue full, dropping oldest frame");
                        queue.pop_front();
                    }
                    queue.push_back(InboundMessage {
                        topic: topic.to_owned(),
                        payload: data.to_vec(),
                    });
                }
            }
            EventPayload::Error(_) => {
                // A CONNACK refusal surfaces as an error event before the
                // transport drops; everything else is network-level.
                fault.store(FAULT_AUTH, Ordering::Release);
            }
            _ => {}
        })
        .map_err(|_| SessionError::NetworkUnreachable)?;

        // The handshake completes on the client's own task; wait a
        // bounded time for the CONNACK verdict.
        let mut waited_ms: u32 = 0;
        while waited_ms < CONNECT_TIMEOUT_MS {
            if self.online.load(Ordering::Acquire) {
                self.client = Some(client);
                return Ok(());
            }
            if self.connect_fault.load(Ordering::Acquire) == FAULT_AUTH {
                return Err(SessionError::AuthRejected);
            }
            std::thread::sleep(core::time::Duration::from_millis(100));
            waited_ms += 100;
        }
        Err(SessionError::NetworkUnreachable)
    }

    fn platform_disconnect(&mut self) {
        // Dropping the client tears the session down.
        self.client = None;
        self.online.store(false, Ordering::Release);
        if let Ok(mut queue) = self.inbound.lock() {
            queue.clear();
        }
    }

    fn platform_subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        use esp_idf_svc::mqtt::client::QoS;
        let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .map(|_| ())
            .map_err(|_| SessionError::SubscribeRejected)
    }

    fn platform_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), SessionError> {
        use esp_idf_svc::mqtt::client::QoS;
        let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
        client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .map(|_| ())
            .map_err(|_| SessionError::PublishRejected)
    }

    fn platform_poll(&mut self) -> Vec<InboundMessage> {
        match self.inbound.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn platform_is_connected(&self) -> bool {
        self.client.is_some() && self.online.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Platform: host simulation
// ───────────────────────────────────────────────────────────────

/// One publish recorded by the simulated broker.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimBroker {
    connected: bool,
    link_up_override: Option<bool>,
    connect_attempts: u32,
    next_connect_error: Option<SessionError>,
    next_subscribe_error: Option<SessionError>,
    reject_publishes: bool,
    inbound: VecDeque<InboundMessage>,
    published: Vec<PublishRecord>,
}

#[cfg(not(target_os = "espidf"))]
impl MqttSession {
    fn platform_connect(&mut self) -> Result<(), SessionError> {
        self.sim.connect_attempts += 1;
        if let Some(e) = self.sim.next_connect_error.take() {
            return Err(e);
        }
        self.sim.connected = true;
        self.sim.link_up_override = None;
        Ok(())
    }

    fn platform_disconnect(&mut self) {
        self.sim.connected = false;
        self.sim.inbound.clear();
    }

    fn platform_subscribe(&mut self, _topic: &str) -> Result<(), SessionError> {
        if !self.sim.connected {
            return Err(SessionError::NotConnected);
        }
        if let Some(e) = self.sim.next_subscribe_error.take() {
            return Err(e);
        }
        Ok(())
    }

    fn platform_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), SessionError> {
        if !self.sim.connected || self.sim.link_up_override == Some(false) {
            return Err(SessionError::NotConnected);
        }
        if self.sim.reject_publishes {
            return Err(SessionError::PublishRejected);
        }
        self.sim.published.push(PublishRecord {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }

    fn platform_poll(&mut self) -> Vec<InboundMessage> {
        // Only the subscribed topic is deliverable, as on the device
        // where the broker routes by subscription.
        let subscribed = self.subscribed.clone();
        self.sim
            .inbound
            .drain(..)
            .filter(|m| Some(&m.topic) == subscribed.as_ref())
            .collect()
    }

    fn platform_is_connected(&self) -> bool {
        self.sim.link_up_override.unwrap_or(self.sim.connected)
    }

    // ── Test hooks ────────────────────────────────────────────

    /// Queue an inbound frame as if the broker delivered it on the
    /// subscribed control topic. Oversized frames are dropped exactly
    /// as the device callback drops them.
    pub fn inject_inbound(&mut self, topic: &str, payload: &[u8]) {
        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!("mqtt(sim): dropping oversized frame ({} bytes)", payload.len());
            return;
        }
        if self.sim.inbound.len() >= INBOUND_QUEUE_CAP {
            warn!("mqtt(sim): inbound queue full, dropping oldest frame");
            self.sim.inbound.pop_front();
        }
        self.sim.inbound.push_back(InboundMessage {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        });
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> &[PublishRecord] {
        &self.sim.published
    }

    /// Script the next `connect()` to fail with `e`.
    pub fn fail_next_connect(&mut self, e: SessionError) {
        self.sim.next_connect_error = Some(e);
    }

    /// Script the next `subscribe()` to fail with `e`.
    pub fn fail_next_subscribe(&mut self, e: SessionError) {
        self.sim.next_subscribe_error = Some(e);
    }

    /// Make every publish fail until restored, without dropping the
    /// session — models a jammed egress path.
    pub fn set_reject_publishes(&mut self, reject: bool) {
        self.sim.reject_publishes = reject;
    }

    /// Simulate transport loss as seen by liveness checks.
    pub fn drop_link(&mut self) {
        self.sim.link_up_override = Some(false);
    }

    /// Total `connect()` attempts, for backoff assertions.
    pub fn connect_attempts(&self) -> u32 {
        self.sim.connect_attempts
    }
}

// ───────────────────────────────────────────────────────────────
// SessionPort
// ───────────────────────────────────────────────────────────────

impl SessionPort for MqttSession {
    fn connect(&mut self) -> Result<(), SessionError> {
        info!(
            "mqtt: connecting to {}:{} as '{}'",
            self.params.host, self.params.port, self.params.client_id
        );
        self.platform_connect()?;
        info!("mqtt: session established");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.subscribed = None;
        info!("mqtt: session closed");
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if !self.platform_is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.platform_subscribe(topic)?;
        self.subscribed = Some(topic.to_owned());
        info!("mqtt: subscribed to '{topic}'");
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SessionError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(SessionError::PayloadTooLarge(payload.len()));
        }
        self.platform_publish(topic, payload, retain)
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        self.platform_poll()
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }
}
