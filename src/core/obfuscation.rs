//! # Packet Obfuscation
//!
//! NSCA's optional XOR scrambling of the alert packet.
//!
//! This is **not** encryption. The XOR method only keeps packets from being
//! readable at a glance; anyone holding the IV (sent in clear by the server)
//! and the shared secret can undo it.
//!
//! ## XOR method
//! 1. `buf[i] ^= iv[i % 128]`
//! 2. if the secret is non-empty, `buf[i] ^= secret[i % secret.len()]`
//!
//! The second pass restarts its index at zero. The server undoes the passes in
//! the same order, and since XOR is self-inverse applying [`transform`] twice
//! with the same inputs restores the buffer.

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::IV_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Obfuscation applied to the packet after the checksum is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ObfuscationMethod {
    #[default]
    None = 0,
    Xor = 1,
}

impl ObfuscationMethod {
    /// Numeric code used in configuration files.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for ObfuscationMethod {
    type Error = ProtocolError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ObfuscationMethod::None),
            1 => Ok(ObfuscationMethod::Xor),
            other => Err(ProtocolError::UnsupportedObfuscationMethod(other)),
        }
    }
}

impl From<ObfuscationMethod> for i64 {
    fn from(method: ObfuscationMethod) -> Self {
        method.code()
    }
}

impl fmt::Display for ObfuscationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObfuscationMethod::None => f.write_str("none"),
            ObfuscationMethod::Xor => f.write_str("xor"),
        }
    }
}

/// Obfuscate `buffer` in place.
///
/// Must run after the checksum has been written; the server verifies the CRC
/// on the recovered plaintext.
pub fn transform(method: ObfuscationMethod, buffer: &mut [u8], iv: &[u8; IV_SIZE], secret: &[u8]) {
    match method {
        ObfuscationMethod::None => {}
        ObfuscationMethod::Xor => {
            for (byte, key) in buffer.iter_mut().zip(iv.iter().cycle()) {
                *byte ^= key;
            }

            if !secret.is_empty() {
                for (byte, key) in buffer.iter_mut().zip(secret.iter().cycle()) {
                    *byte ^= key;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let original: Vec<u8> = (0..=255u8).collect();
        let mut buf = original.clone();
        transform(ObfuscationMethod::None, &mut buf, &[0x5A; IV_SIZE], b"secret");
        assert_eq!(buf, original);
    }

    #[test]
    fn xor_cycles_iv_then_secret() {
        let mut iv = [0u8; IV_SIZE];
        iv[0] = 0x01;
        iv[1] = 0x02;
        let mut buf = vec![0u8; IV_SIZE + 2];

        transform(ObfuscationMethod::Xor, &mut buf, &iv, b"ab");

        // position 0: iv[0] ^ 'a'; position 1: iv[1] ^ 'b'
        assert_eq!(buf[0], 0x01 ^ b'a');
        assert_eq!(buf[1], 0x02 ^ b'b');
        assert_eq!(buf[2], b'a');
        // IV index wraps at 128, secret index restarts independently
        assert_eq!(buf[IV_SIZE], 0x01 ^ b'a');
        assert_eq!(buf[IV_SIZE + 1], 0x02 ^ b'b');
    }

    #[test]
    fn xor_without_secret_only_applies_iv() {
        let mut buf = vec![0u8; 4];
        transform(ObfuscationMethod::Xor, &mut buf, &[0xAA; IV_SIZE], b"");
        assert_eq!(buf, vec![0xAA; 4]);
    }

    #[test]
    fn unknown_method_code_is_an_error() {
        assert!(matches!(
            ObfuscationMethod::try_from(2),
            Err(ProtocolError::UnsupportedObfuscationMethod(2))
        ));
        assert_eq!(ObfuscationMethod::try_from(1).unwrap(), ObfuscationMethod::Xor);
    }
}
