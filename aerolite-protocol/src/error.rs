//! Protocol error types and server result codes.

use std::fmt;
use thiserror::Error;

/// Ways the fixed 8-byte outer header can fail validation.
///
/// Any of these means frame alignment on the stream is no longer
/// trustworthy; transports react by resynchronizing or disconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDefect {
    /// Fewer than 8 bytes were available for the header.
    ShortHeader { available: usize },
    /// The version byte was not 2.
    BadVersion(u8),
    /// The message type byte was neither 1 (info) nor 3 (record message).
    BadMessageType(u8),
}

impl fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDefect::ShortHeader { available } => {
                write!(f, "header needs 8 bytes, got {}", available)
            }
            FrameDefect::BadVersion(version) => {
                write!(f, "unsupported protocol version {}", version)
            }
            FrameDefect::BadMessageType(msg_type) => {
                write!(f, "invalid message type {}", msg_type)
            }
        }
    }
}

/// Errors raised by the pure codecs.
///
/// These are structural: feeding the same bytes in again cannot help, so
/// the exchange engine surfaces them without retrying.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The outer header failed validation.
    #[error("malformed frame: {0}")]
    MalformedFrame(FrameDefect),

    /// A declared size overran the bytes actually available.
    #[error("truncated payload: need {needed} bytes, have {available}")]
    TruncatedPayload { needed: usize, available: usize },

    /// Payload larger than the declared limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    /// Text was required (bin names, info payloads) but the bytes were not
    /// valid UTF-8.
    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    /// Bin names are length-prefixed by a single byte on the wire.
    #[error("bin name too long: {0} bytes (max 255)")]
    BinNameTooLong(usize),

    /// Field counts live in a 16-bit header slot.
    #[error("too many fields: {0} (max 65535)")]
    TooManyFields(usize),

    /// Operation counts live in a 16-bit header slot.
    #[error("too many operations: {0} (max 65535)")]
    TooManyOps(usize),
}

/// Server result code carried in byte 5 of every record message header.
///
/// The wire byte is interpreted as a signed value. Negative codes are
/// client-side pseudo-codes that never come off the wire but keep their
/// slots in the diagnostic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i8);

impl ResultCode {
    pub const TYPE_NOT_SUPPORTED: ResultCode = ResultCode(-7);
    pub const COMMAND_REJECTED: ResultCode = ResultCode(-6);
    pub const QUERY_TERMINATED: ResultCode = ResultCode(-5);
    pub const SCAN_TERMINATED: ResultCode = ResultCode(-4);
    pub const INVALID_NODE_ERROR: ResultCode = ResultCode(-3);
    pub const PARSE_ERROR: ResultCode = ResultCode(-2);
    pub const SERIALIZE_ERROR: ResultCode = ResultCode(-1);
    pub const OK: ResultCode = ResultCode(0);
    pub const SERVER_ERROR: ResultCode = ResultCode(1);
    pub const KEY_NOT_FOUND: ResultCode = ResultCode(2);
    pub const GENERATION_ERROR: ResultCode = ResultCode(3);
    pub const PARAMETER_ERROR: ResultCode = ResultCode(4);
    pub const KEY_EXISTS: ResultCode = ResultCode(5);
    pub const BIN_EXISTS: ResultCode = ResultCode(6);
    pub const SERVER_MEM_ERROR: ResultCode = ResultCode(8);
    pub const CLUSTER_KEY_MISMATCH: ResultCode = ResultCode(14);
    pub const INVALID_NAMESPACE: ResultCode = ResultCode(20);

    /// Interprets the wire byte as a signed code.
    pub fn from_wire(byte: u8) -> Self {
        ResultCode(byte as i8)
    }

    pub fn to_wire(self) -> u8 {
        self.0 as u8
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::OK
    }

    /// The soft miss: tolerated per-record inside batch replies and mapped
    /// to `false`/`None` answers by the high-level API.
    pub fn is_not_found(self) -> bool {
        self == ResultCode::KEY_NOT_FOUND
    }

    /// Human-readable description, or `None` for codes outside the table.
    pub fn description(self) -> Option<&'static str> {
        let text = match self {
            ResultCode::TYPE_NOT_SUPPORTED => "type not supported",
            ResultCode::COMMAND_REJECTED => "command rejected",
            ResultCode::QUERY_TERMINATED => "query terminated",
            ResultCode::SCAN_TERMINATED => "scan terminated",
            ResultCode::INVALID_NODE_ERROR => "invalid node",
            ResultCode::PARSE_ERROR => "parse error",
            ResultCode::SERIALIZE_ERROR => "serialize error",
            ResultCode::OK => "ok",
            ResultCode::SERVER_ERROR => "unspecified server error",
            ResultCode::KEY_NOT_FOUND => "key not found",
            ResultCode::GENERATION_ERROR => "generation mismatch",
            ResultCode::PARAMETER_ERROR => "bad parameter",
            ResultCode::KEY_EXISTS => "key already exists",
            ResultCode::BIN_EXISTS => "bin already exists",
            ResultCode::SERVER_MEM_ERROR => "server out of memory",
            ResultCode::CLUSTER_KEY_MISMATCH => "cluster key mismatch",
            ResultCode::INVALID_NAMESPACE => "invalid namespace",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "{} ({})", text, self.0),
            None => write!(f, "unknown result code {}", self.0),
        }
    }
}
