use bytes::{BufMut, BytesMut};

use crate::protocol::channel::Channel;
use crate::protocol::handshake::HandshakeInfo;
use crate::protocol::message::Alert;

/// NSCA packet version written into every alert
pub const PACKET_VERSION: u16 = 3;

/// Width of the version field (2 bytes used)
pub const VERSION_FIELD_SIZE: usize = 4;
/// Width of the CRC-32 field
pub const CHECKSUM_FIELD_SIZE: usize = 4;
/// Width of the echoed server timestamp
pub const TIMESTAMP_FIELD_SIZE: usize = 4;
/// Width of the severity field (2 bytes used)
pub const SEVERITY_FIELD_SIZE: usize = 4;
/// Width of the reporting host field
pub const HOST_FIELD_SIZE: usize = 64;
/// Width of the service description field
pub const SERVICE_FIELD_SIZE: usize = 128;
/// Width of the plugin output field
pub const MESSAGE_FIELD_SIZE: usize = 512;

pub const CHECKSUM_OFFSET: usize = VERSION_FIELD_SIZE;
pub const TIMESTAMP_OFFSET: usize = CHECKSUM_OFFSET + CHECKSUM_FIELD_SIZE;
pub const SEVERITY_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_FIELD_SIZE;
pub const HOST_OFFSET: usize = SEVERITY_OFFSET + SEVERITY_FIELD_SIZE;
pub const SERVICE_OFFSET: usize = HOST_OFFSET + HOST_FIELD_SIZE;
pub const MESSAGE_OFFSET: usize = SERVICE_OFFSET + SERVICE_FIELD_SIZE;

/// Total packet size on the wire (720 bytes)
pub const PACKET_SIZE: usize = MESSAGE_OFFSET + MESSAGE_FIELD_SIZE;

/// Placeholder for a missing reporting host or service name
pub const UNKNOWN_FIELD: &str = "UNKNOWN";

/// Build the 720-byte alert packet and stamp its checksum.
///
/// Pure: the same channel, handshake and alert always produce the same bytes.
/// Over-long strings are cut to their field width without error.
pub fn encode(channel: &Channel, handshake: &HandshakeInfo, alert: &Alert) -> BytesMut {
    let host = channel.reporting_host().unwrap_or(UNKNOWN_FIELD);
    let service = match channel.service_name() {
        "" => UNKNOWN_FIELD,
        name => name,
    };

    let mut buf = BytesMut::with_capacity(PACKET_SIZE);
    buf.put_u16(PACKET_VERSION);
    buf.put_u16(0);
    buf.put_u32(0);
    buf.put_i32(handshake.timestamp);
    buf.put_u16(alert.severity.code());
    buf.put_u16(0);
    put_padded(&mut buf, host.as_bytes(), HOST_FIELD_SIZE);
    put_padded(&mut buf, service.as_bytes(), SERVICE_FIELD_SIZE);
    put_padded(&mut buf, &alert.sanitized_message(), MESSAGE_FIELD_SIZE);
    debug_assert_eq!(buf.len(), PACKET_SIZE);

    let crc = checksum(&buf);
    buf[CHECKSUM_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&crc.to_be_bytes());
    buf
}

/// CRC-32 of `packet` computed as if its checksum field were zero.
pub fn checksum(packet: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    if packet.len() < TIMESTAMP_OFFSET {
        hasher.update(packet);
        return hasher.finalize();
    }
    hasher.update(&packet[..CHECKSUM_OFFSET]);
    hasher.update(&[0u8; CHECKSUM_FIELD_SIZE]);
    hasher.update(&packet[TIMESTAMP_OFFSET..]);
    hasher.finalize()
}

/// True when the stored checksum matches the recomputed one.
pub fn verify_checksum(packet: &[u8]) -> bool {
    if packet.len() != PACKET_SIZE {
        return false;
    }
    let mut stored = [0u8; CHECKSUM_FIELD_SIZE];
    stored.copy_from_slice(&packet[CHECKSUM_OFFSET..TIMESTAMP_OFFSET]);
    u32::from_be_bytes(stored) == checksum(packet)
}

#[inline]
fn put_padded(buf: &mut BytesMut, value: &[u8], width: usize) {
    let len = value.len().min(width);
    buf.put_slice(&value[..len]);
    buf.put_bytes(0, width - len);
}
