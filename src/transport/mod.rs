//! # Transport Layer
//!
//! TCP connection lifecycle for one alert: bounded connect attempts, the
//! server greeting, a single packet write and a guaranteed close.

pub mod tcp;

pub use tcp::{ConnectionState, NscaConnection, CONNECT_ATTEMPTS};
