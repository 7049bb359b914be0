//! Unified error types for the switchboard agent.
//!
//! Follows embedded best practice: a single `Error` enum that every
//! subsystem can convert into, keeping the control loop's error handling
//! uniform. All variants are `Copy`-cheap and allocation-free so they can
//! pass through the supervisor without heap traffic.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

/// Every fallible operation in the agent funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An inbound command payload could not be decoded.
    Decode(DecodeError),
    /// A broker session operation failed.
    Session(SessionError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command decode errors
// ---------------------------------------------------------------------------

/// A command payload was rejected wholesale; no outputs were touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not syntactically valid JSON.
    InvalidJson,
    /// The payload parsed, but the top-level value is not an object.
    NotAnObject,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson => write!(f, "payload is not valid JSON"),
            Self::NotAnObject => write!(f, "top-level value is not an object"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Broker session errors
// ---------------------------------------------------------------------------

/// Failures of the transport session.
///
/// `NetworkUnreachable` and `AuthRejected` stay distinct so the supervisor
/// could cap retries on persistent credential failure; current policy
/// retries both with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// TCP connect or MQTT handshake failed at the network level.
    NetworkUnreachable,
    /// The broker refused the CONNECT credentials.
    AuthRejected,
    /// Operation requires a live session and there is none.
    NotConnected,
    /// The broker rejected the subscription request.
    SubscribeRejected,
    /// The publish could not be sent.
    PublishRejected,
    /// Payload exceeds the device message buffer; never truncated.
    PayloadTooLarge(usize),
    /// The state snapshot could not be serialized.
    EncodeFailed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkUnreachable => write!(f, "broker unreachable"),
            Self::AuthRejected => write!(f, "broker rejected credentials"),
            Self::NotConnected => write!(f, "not connected"),
            Self::SubscribeRejected => write!(f, "subscribe rejected"),
            Self::PublishRejected => write!(f, "publish rejected"),
            Self::PayloadTooLarge(n) => write!(f, "payload too large ({n} bytes)"),
            Self::EncodeFailed => write!(f, "state encode failed"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Agent-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
