//! Codec trait and the binary implementation used on the wire.
//!
//! A codec converts between [`Packet`]s and the payload of one WebSocket
//! binary frame. WebSocket framing already delimits messages, so a codec
//! only ever sees whole packets: one frame in, one packet out.

use bincode::{ErrorKind, Options};

use crate::{DecodeError, EncodeError, Packet, PacketTag};

/// Converts packets to frame payloads and back.
///
/// `Send + Sync + 'static` lets a codec live inside long-running tick loops
/// on any runtime thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a packet. Deterministic: equal packets give equal bytes.
    ///
    /// # Errors
    /// [`EncodeError`] if the serializer fails.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, EncodeError>;

    /// Parses one frame payload.
    ///
    /// # Errors
    /// Any [`DecodeError`]. The caller is expected to close the connection
    /// that sent the frame.
    fn decode(&self, data: &[u8]) -> Result<Packet, DecodeError>;
}

// ---------------------------------------------------------------------------
// BinaryCodec
// ---------------------------------------------------------------------------

/// The production codec, built on `bincode`: `[tag: u32 LE][fields...]`.
///
/// Integers and floats are fixed-width little-endian, strings and sequences
/// carry a `u64` length prefix, and status enums take one byte.
///
/// ```rust
/// use roomrelay_protocol::{BinaryCodec, Codec, Packet, RoomId};
///
/// let codec = BinaryCodec;
/// let packet = Packet::JoinRoomRequest { room_id: RoomId(4), ticket: 77 };
///
/// let bytes = codec.encode(&packet).unwrap();
/// assert_eq!(&bytes[..4], &6u32.to_le_bytes());
/// assert_eq!(codec.decode(&bytes).unwrap(), packet);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

impl Codec for BinaryCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, EncodeError> {
        options()
            .serialize(packet)
            .map_err(|e| EncodeError(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<Packet, DecodeError> {
        let header = data
            .first_chunk::<4>()
            .ok_or(DecodeError::Truncated)?;
        let tag = PacketTag(u32::from_le_bytes(*header));
        if !tag.is_known() {
            return Err(DecodeError::UnknownTag(tag.0));
        }

        // The limit makes an oversized length prefix fail before anything
        // is allocated for it.
        let mut rest = data;
        let packet = options()
            .with_limit(data.len() as u64)
            .deserialize_from(&mut rest)
            .map_err(decode_error)?;
        if !rest.is_empty() {
            return Err(DecodeError::TrailingBytes(rest.len()));
        }
        Ok(packet)
    }
}

fn decode_error(err: bincode::Error) -> DecodeError {
    match *err {
        ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            DecodeError::Truncated
        }
        ErrorKind::SizeLimit => DecodeError::Truncated,
        ErrorKind::InvalidUtf8Encoding(_) => DecodeError::InvalidUtf8,
        ErrorKind::InvalidBoolEncoding(byte) => {
            DecodeError::InvalidValue(format!("invalid bool {byte}"))
        }
        other => DecodeError::InvalidValue(other.to_string()),
    }
}
