//! Agent configuration.
//!
//! Broker identity, topics, and loop timing. Values are provisioned into
//! NVS by the external setup tooling; the compiled-in defaults are
//! deliberately unprovisioned and fail [`AgentConfig::validate`], so a
//! device that was never provisioned halts at boot with a diagnostic
//! instead of crash-looping against a broker it cannot identify to.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Connection and loop parameters for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Broker session ---
    /// Broker hostname or IP.
    pub broker_host: String,
    /// Broker TCP port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Broker account username.
    pub username: String,
    /// Broker account password.
    pub password: String,

    // --- Wi-Fi link ---
    pub wifi_ssid: String,
    pub wifi_password: String,

    // --- Topics ---
    /// Topic commands arrive on.
    pub control_topic: String,
    /// Topic state is published to (retained).
    pub state_topic: String,

    // --- Timing ---
    /// Control loop tick interval (milliseconds).
    pub poll_interval_ms: u32,
    /// Reconnect backoff floor (seconds).
    pub reconnect_min_secs: u32,
    /// Reconnect backoff cap (seconds).
    pub reconnect_max_secs: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker_host: String::new(),
            broker_port: 1883,
            client_id: "switchboard".into(),
            username: String::new(),
            password: String::new(),
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            control_topic: "appliances/switchboard/control".into(),
            state_topic: "appliances/switchboard/state".into(),
            poll_interval_ms: 100,
            reconnect_min_secs: 2,
            reconnect_max_secs: 60,
        }
    }
}

fn valid_publish_topic(topic: &str) -> bool {
    // Wildcards are subscription syntax; NUL is forbidden by MQTT outright.
    !topic.is_empty() && !topic.contains(['+', '#', '\0'])
}

impl AgentConfig {
    /// Validate the configuration for boot.
    ///
    /// There is no degraded mode without a broker identity, so any failure
    /// here is fatal to the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.is_empty() {
            return Err(ConfigError::ValidationFailed("broker_host must be set"));
        }
        if self.broker_port == 0 {
            return Err(ConfigError::ValidationFailed("broker_port must be nonzero"));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::ValidationFailed("client_id must be set"));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "broker credentials not provisioned",
            ));
        }
        if self.wifi_ssid.is_empty() {
            return Err(ConfigError::ValidationFailed("wifi_ssid must be set"));
        }
        if !valid_publish_topic(&self.control_topic) {
            return Err(ConfigError::ValidationFailed(
                "control_topic must be a literal topic (no wildcards)",
            ));
        }
        if !valid_publish_topic(&self.state_topic) {
            return Err(ConfigError::ValidationFailed(
                "state_topic must be a literal topic (no wildcards)",
            ));
        }
        if self.control_topic == self.state_topic {
            return Err(ConfigError::ValidationFailed(
                "control_topic and state_topic must differ",
            ));
        }
        if !(10..=5000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be 10–5000",
            ));
        }
        if self.reconnect_min_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "reconnect_min_secs must be nonzero",
            ));
        }
        if self.reconnect_min_secs > self.reconnect_max_secs || self.reconnect_max_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "reconnect backoff must satisfy min <= max <= 300",
            ));
        }
        Ok(())
    }
}
