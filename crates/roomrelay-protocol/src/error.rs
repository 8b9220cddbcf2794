//! Error types for the protocol layer.
//!
//! Decoding works on untrusted bytes, so every way a frame can be malformed
//! maps onto one [`DecodeError`] variant. None of them panic, and none of
//! them leave a partially decoded packet behind.

/// Why a frame could not be turned into a packet.
///
/// A `DecodeError` always means the sender is broken or hostile. The
/// connection that produced the frame should be closed; there is no attempt
/// to resynchronize.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The leading tag does not name any known packet.
    #[error("unknown packet tag {0}")]
    UnknownTag(u32),

    /// The frame ended before a field was complete, or a length prefix
    /// claimed more bytes than the frame holds.
    #[error("truncated frame")]
    Truncated,

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A field decoded to a value outside its domain (bad enum byte, bad
    /// boolean).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The packet decoded completely but bytes were left over.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

/// A packet could not be serialized.
///
/// Every [`Packet`](crate::Packet) has a fixed representation, so this only
/// shows up if the serializer itself gives out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot encode packet: {0}")]
pub struct EncodeError(pub String);
