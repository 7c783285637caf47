use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nagios return code carried by an alert.
///
/// "No message queued" is expressed as `Option<Severity>::None` and never
/// reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Ok,
        Severity::Warning,
        Severity::Critical,
        Severity::Unknown,
    ];

    /// Numeric return code as written into the packet.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<i64> for Severity {
    type Error = ProtocolError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Severity::Ok),
            1 => Ok(Severity::Warning),
            2 => Ok(Severity::Critical),
            3 => Ok(Severity::Unknown),
            other => Err(ProtocolError::UnknownSeverity(other)),
        }
    }
}

impl FromStr for Severity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "0" => Ok(Severity::Ok),
            "warning" | "warn" | "1" => Ok(Severity::Warning),
            "critical" | "2" => Ok(Severity::Critical),
            "unknown" | "3" => Ok(Severity::Unknown),
            _ => Err(ProtocolError::InvalidConfiguration(format!(
                "Unrecognized severity: '{s}'"
            ))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A single passive check result waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Message bytes with line breaks removed; NSCA daemons split on them.
    pub fn sanitized_message(&self) -> Vec<u8> {
        self.message
            .bytes()
            .filter(|b| *b != b'\n' && *b != b'\r')
            .collect()
    }
}
