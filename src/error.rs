//! # Error Types
//!
//! Error handling for the NSCA client.
//!
//! Errors fall into two groups:
//! - **Construction errors**: invalid configuration, unknown obfuscation method or
//!   severity code. These are returned to the caller and stop channel creation.
//! - **Per-send failures**: connection, handshake, write and queue failures. These
//!   never reach the caller of `send`; the worker records them by [`FailureKind`].
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use nsca_protocol::core::obfuscation::ObfuscationMethod;
//! use nsca_protocol::error::{ProtocolError, Result};
//!
//! fn method_from_config(code: i64) -> Result<ObfuscationMethod> {
//!     ObfuscationMethod::try_from(code)
//! }
//!
//! match method_from_config(7) {
//!     Err(ProtocolError::UnsupportedObfuscationMethod(7)) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";
    pub const ERR_NO_RUNTIME: &str = "Dispatcher must be created inside a Tokio runtime";

    /// Channel validation errors
    pub const ERR_EMPTY_HOST: &str = "Target host cannot be empty";
    pub const ERR_EMPTY_SERVICE: &str = "Service name cannot be empty";
    pub const ERR_ZERO_PORT: &str = "Target port must be greater than 0";

    /// Handshake errors
    pub const ERR_HANDSHAKE_EOF: &str = "Connection closed before the handshake was received";
    pub const ERR_HANDSHAKE_TIMEOUT: &str = "Timed out waiting for the server handshake";

    /// Connection errors
    pub const ERR_CONNECT_TIMEOUT: &str = "Connection attempt timed out";
}

// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported obfuscation method: {0}")]
    UnsupportedObfuscationMethod(i64),

    #[error("Unknown severity code: {0}")]
    UnknownSeverity(i64),

    #[error("Failed to connect to {address} after {attempts} attempts: {reason}")]
    ConnectionError {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Send queue is full; alert rejected")]
    QueueRejected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid packet length: {0} bytes")]
    InvalidPacketLength(usize),

    #[error("Connection used out of order: {0}")]
    UnexpectedState(String),

    #[error("Dispatcher has been shut down")]
    DispatcherClosed,

    #[error("{}", constants::ERR_NO_RUNTIME)]
    RuntimeUnavailable,

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(String),
}

/// Tag describing how a single send ended when it did not succeed.
///
/// Workers report failures through this value instead of raising them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidConfiguration,
    Connection,
    Handshake,
    Send,
    QueueRejected,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidConfiguration => "invalid_configuration",
            FailureKind::Connection => "connection",
            FailureKind::Handshake => "handshake",
            FailureKind::Send => "send",
            FailureKind::QueueRejected => "queue_rejected",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl ProtocolError {
    /// Classify this error for per-send reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProtocolError::InvalidConfiguration(_)
            | ProtocolError::UnsupportedObfuscationMethod(_)
            | ProtocolError::UnknownSeverity(_) => FailureKind::InvalidConfiguration,
            ProtocolError::ConnectionError { .. } => FailureKind::Connection,
            ProtocolError::HandshakeError(_) => FailureKind::Handshake,
            ProtocolError::Io(_) | ProtocolError::Timeout | ProtocolError::InvalidPacketLength(_) => {
                FailureKind::Send
            }
            ProtocolError::QueueRejected => FailureKind::QueueRejected,
            ProtocolError::UnexpectedState(_)
            | ProtocolError::DispatcherClosed
            | ProtocolError::RuntimeUnavailable
            | ProtocolError::LockPoisoned(_) => FailureKind::Internal,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_split_construction_from_delivery() {
        assert_eq!(
            ProtocolError::UnsupportedObfuscationMethod(9).kind(),
            FailureKind::InvalidConfiguration
        );
        assert_eq!(
            ProtocolError::ConnectionError {
                address: "localhost:5667".into(),
                attempts: 3,
                reason: "refused".into(),
            }
            .kind(),
            FailureKind::Connection
        );
        assert_eq!(
            ProtocolError::HandshakeError("short read".into()).kind(),
            FailureKind::Handshake
        );
        assert_eq!(ProtocolError::Timeout.kind(), FailureKind::Send);
        assert_eq!(ProtocolError::QueueRejected.kind(), FailureKind::QueueRejected);
    }

    #[test]
    fn connection_error_message_names_address() {
        let err = ProtocolError::ConnectionError {
            address: "nagios.example:5667".into(),
            attempts: 3,
            reason: "Connection refused".into(),
        };
        let text = err.to_string();
        assert!(text.contains("nagios.example:5667"));
        assert!(text.contains("3 attempts"));
    }
}
