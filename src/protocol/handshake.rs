//! Server greeting read at the start of every NSCA connection.
//!
//! The daemon speaks first: a 128-byte initialization vector followed by its
//! current time as a big-endian signed 32-bit integer. The client never
//! validates the timestamp; it is echoed back inside the alert packet.

use crate::error::{ProtocolError, Result};

/// Size of the server-issued initialization vector.
pub const IV_SIZE: usize = 128;

/// Size of the server timestamp that follows the IV.
pub const TIMESTAMP_SIZE: usize = 4;

/// Total bytes the server sends before the client writes its packet.
pub const HANDSHAKE_SIZE: usize = IV_SIZE + TIMESTAMP_SIZE;

/// IV and timestamp received from the server for one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    pub iv: [u8; IV_SIZE],
    pub timestamp: i32,
}

impl HandshakeInfo {
    pub fn new(iv: [u8; IV_SIZE], timestamp: i32) -> Self {
        Self { iv, timestamp }
    }

    /// Parse a complete handshake. Anything other than exactly
    /// [`HANDSHAKE_SIZE`] bytes is a short or malformed read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HANDSHAKE_SIZE {
            return Err(ProtocolError::HandshakeError(format!(
                "expected {HANDSHAKE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[..IV_SIZE]);

        let mut ts = [0u8; TIMESTAMP_SIZE];
        ts.copy_from_slice(&bytes[IV_SIZE..]);

        Ok(Self {
            iv,
            timestamp: i32::from_be_bytes(ts),
        })
    }

    /// Wire form, as a server would send it.
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..IV_SIZE].copy_from_slice(&self.iv);
        out[IV_SIZE..].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }
}

// The IV is key material for the obfuscation pass; keep it out of logs.
impl std::fmt::Debug for HandshakeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeInfo")
            .field("iv", &format_args!("[{IV_SIZE} bytes]"))
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
