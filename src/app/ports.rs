//! Port traits — the hexagonal boundary between domain logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SwitchboardService (domain)
//! ```
//!
//! Driven adapters (relay bank, broker session, Wi-Fi link, config
//! storage) implement these traits. The domain core consumes them via
//! generics, so it never touches hardware or sockets directly.

use core::fmt;

use crate::config::AgentConfig;
use crate::error::SessionError;

/// Largest payload the session will send or accept, bounded by the
/// device message buffer. Oversized publishes fail typed; oversized
/// inbound frames are dropped with a diagnostic, never truncated.
pub const MAX_PAYLOAD_BYTES: usize = 256;

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the registry calls this to drive a physical line.
pub trait RelayPort {
    /// Drive `line` high or low. Infallible at this boundary — a GPIO
    /// write on a claimed push-pull output cannot fail on this platform.
    fn write_level(&mut self, line: i32, high: bool);
}

// ───────────────────────────────────────────────────────────────
// Broker session port (driven adapter: domain ↔ MQTT)
// ───────────────────────────────────────────────────────────────

/// One complete inbound message from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A single broker session: connect, subscribe, publish, poll.
///
/// `poll` must be non-blocking — the same loop iteration is responsible
/// for detecting disconnection and driving reconnect timing. Messages
/// are drained out of `poll` and handled afterwards, so a handler may
/// publish through the same session without re-entering `poll`.
pub trait SessionPort {
    /// Open the TCP connection and complete the MQTT handshake.
    fn connect(&mut self) -> Result<(), SessionError>;

    /// Tear the session down. Safe to call in any state.
    fn disconnect(&mut self);

    /// Subscribe to `topic` on the live session.
    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;

    /// Publish `payload` to `topic`, optionally retained.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), SessionError>;

    /// Drain pending complete inbound messages. Non-blocking.
    fn poll(&mut self) -> Vec<InboundMessage>;

    /// Whether the session is currently live.
    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi link port (driven adapter: domain ↔ network association)
// ───────────────────────────────────────────────────────────────

/// Network link boundary. Association and IP acquisition are the
/// platform's business; the control loop only needs "is the link up"
/// and a place to drive reconnect pacing from.
pub trait LinkPort {
    /// Begin association with the configured access point.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Whether the link is associated and has an address.
    fn is_up(&self) -> bool;

    /// Advance link reconnect bookkeeping by one control tick.
    fn poll(&mut self, elapsed_secs: f32);
}

/// Errors from [`LinkPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No SSID configured.
    NoCredentials,
    /// SSID outside 1–32 printable ASCII bytes.
    InvalidSsid,
    /// Password outside 8–64 bytes (empty allowed for open networks).
    InvalidPassword,
    /// Association or DHCP failed.
    ConnectFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no Wi-Fi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes, or empty for open)")
            }
            Self::ConnectFailed => write!(f, "Wi-Fi connection failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the agent configuration.
///
/// Implementations MUST validate before persisting; a compromised
/// provisioning channel must not be able to store a config the next
/// boot cannot use.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`AgentConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<AgentConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &AgentConfig) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed validation; the message names the field.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
