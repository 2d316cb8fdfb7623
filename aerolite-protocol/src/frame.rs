//! Binary framing for the node protocol.
//!
//! Every message travels inside an envelope whose 8-byte header is one
//! big-endian word:
//!
//! ```text
//! +---------+----------+---------------------+
//! | version | msg_type | size                |
//! | 1 byte  | 1 byte   | 6 bytes (48-bit BE) |
//! +---------+----------+---------------------+
//! | payload (size bytes)                     |
//! +------------------------------------------+
//! ```
//!
//! `size` counts exactly the payload bytes that follow the header. Info
//! payloads are UTF-8 text; record message payloads are the binary format
//! in [`crate::message`].

use crate::error::{FrameDefect, ProtocolError};
use crate::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use bytes::{BufMut, BytesMut};

/// Size of the outer frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Payload kind carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 text info request or response.
    Info = 1,
    /// Binary record message.
    Message = 3,
}

impl MessageType {
    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(MessageType::Info),
            3 => Ok(MessageType::Message),
            other => Err(ProtocolError::MalformedFrame(FrameDefect::BadMessageType(
                other,
            ))),
        }
    }
}

/// A parsed outer frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version, always 2.
    pub version: u8,
    /// Payload kind.
    pub msg_type: MessageType,
    /// Payload length in bytes.
    pub size: u64,
}

impl FrameHeader {
    /// Creates a header for the current protocol version.
    pub fn new(msg_type: MessageType, size: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type,
            size,
        }
    }

    /// Packs the header into its big-endian word, rejecting sizes that do
    /// not fit the 48-bit wire field.
    pub fn encode(&self) -> Result<[u8; FRAME_HEADER_SIZE], ProtocolError> {
        if self.size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: self.size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let word = ((self.version as u64) << 56)
            | ((self.msg_type as u64) << 48)
            | self.size;
        Ok(word.to_be_bytes())
    }

    /// Parses and validates a header from the first 8 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame(FrameDefect::ShortHeader {
                available: buf.len(),
            }));
        }

        let version = buf[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::MalformedFrame(FrameDefect::BadVersion(
                version,
            )));
        }

        let msg_type = MessageType::from_wire(buf[1])?;
        let word = u64::from_be_bytes(buf[..FRAME_HEADER_SIZE].try_into().unwrap());

        Ok(Self {
            version,
            msg_type,
            size: word & MAX_PAYLOAD_SIZE,
        })
    }
}

/// Wraps `payload` in the outer envelope.
pub fn pack_frame(msg_type: MessageType, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    let header = FrameHeader::new(msg_type, payload.len() as u64).encode()?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    Ok(buf)
}

/// Splits a complete in-memory buffer into header and payload.
///
/// With `require_exact` the buffer must hold exactly the declared payload;
/// otherwise any trailing bytes are simply part of the returned slice and
/// the caller carves them up (transports read declared sizes themselves
/// and use the strict form).
pub fn unpack_frame(buf: &[u8], require_exact: bool) -> Result<(FrameHeader, &[u8]), ProtocolError> {
    let header = FrameHeader::decode(buf)?;
    let payload = &buf[FRAME_HEADER_SIZE..];

    if require_exact && payload.len() as u64 != header.size {
        return Err(ProtocolError::TruncatedPayload {
            needed: header.size as usize,
            available: payload.len(),
        });
    }

    Ok((header, payload))
}
