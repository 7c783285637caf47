//! # Core Protocol Components
//!
//! Packet layout, checksum, obfuscation and framing for the NSCA wire protocol.
//!
//! ## Components
//! - **Packet**: fixed 720-byte alert layout and CRC-32 stamping
//! - **Obfuscation**: optional XOR scrambling keyed by the server IV and a shared secret
//! - **Codec**: Tokio codec reading the server greeting and writing alert packets
//!
//! ## Wire Format
//! ```text
//! server -> client: [IV(128)] [Timestamp(4)]
//! client -> server: [Version(4)] [CRC32(4)] [Timestamp(4)] [Severity(4)]
//!                   [Host(64)] [Service(128)] [Message(512)]
//! ```
//!
//! All integers are big-endian. Strings are zero-padded and silently truncated.

pub mod codec;
pub mod obfuscation;
pub mod packet;
