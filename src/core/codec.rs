use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::PACKET_SIZE;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{HandshakeInfo, HANDSHAKE_SIZE};

/// Framing for an NSCA client connection.
///
/// Decodes the server's fixed 132-byte greeting and encodes the client's
/// fixed 720-byte alert packet. Neither direction carries a length prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct NscaCodec;

impl Decoder for NscaCodec {
    type Item = HandshakeInfo;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HANDSHAKE_SIZE {
            src.reserve(HANDSHAKE_SIZE - src.len());
            return Ok(None);
        }

        let frame = src.split_to(HANDSHAKE_SIZE);
        HandshakeInfo::from_bytes(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::HandshakeError(format!(
                "short read: {} of {HANDSHAKE_SIZE} bytes",
                src.len()
            ))),
        }
    }
}

impl Encoder<Bytes> for NscaCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Bytes, dst: &mut BytesMut) -> Result<()> {
        if packet.len() != PACKET_SIZE {
            return Err(ProtocolError::InvalidPacketLength(packet.len()));
        }
        dst.extend_from_slice(&packet);
        Ok(())
    }
}

/// Error returned when the stream ends before a complete greeting arrives.
pub(crate) fn handshake_eof() -> ProtocolError {
    ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_EOF.to_string())
}
