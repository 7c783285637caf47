//! # nsca-protocol
//!
//! Asynchronous client for forwarding Nagios passive check results to an NSCA
//! daemon.
//!
//! Each alert travels over its own TCP connection: the daemon sends a 128-byte
//! IV and a timestamp, the client answers with one fixed 720-byte packet
//! carrying a CRC-32, optionally XOR-obfuscated with the IV and a shared
//! secret. Alerts are queued on a bounded worker pool and delivered best
//! effort, at most once, with no ordering guarantee.
//!
//! ## Modules
//! - [`core`]: packet layout, checksum, obfuscation, framing
//! - [`protocol`]: alerts, handshake, channels, dispatcher
//! - [`transport`]: TCP connection state machine
//! - [`service`]: public client and delivery routine
//! - [`config`]: TOML / environment configuration
//! - [`utils`]: logging, metrics, timeouts

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::NscaConfig;
pub use crate::core::obfuscation::ObfuscationMethod;
pub use error::{FailureKind, ProtocolError, Result};
pub use protocol::channel::Channel;
pub use protocol::dispatcher::{Dispatcher, Submission};
pub use protocol::handshake::HandshakeInfo;
pub use protocol::message::{Alert, Severity};
pub use service::client::NscaClient;
