//! # Protocol Layer
//!
//! Alert model, server handshake, immutable channels and the worker pool that
//! delivers alerts in the background.

pub mod channel;
pub mod dispatcher;
pub mod handshake;
pub mod message;
