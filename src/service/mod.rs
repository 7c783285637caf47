//! # Client Services
//!
//! The application-facing [`client::NscaClient`] and the per-alert
//! [`delivery::deliver`] routine the dispatcher's workers run.

pub mod client;
pub mod delivery;
