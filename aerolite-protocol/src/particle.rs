//! Particle values: the tagged scalar representation inside bin
//! operations.
//!
//! The particle type tag travels in the operation header, not alongside
//! the payload, so encoding and decoding take the tag separately.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

pub const PARTICLE_NULL: u8 = 0;
pub const PARTICLE_INTEGER: u8 = 1;
pub const PARTICLE_DOUBLE: u8 = 2;
pub const PARTICLE_STRING: u8 = 3;
pub const PARTICLE_BLOB: u8 = 4;

/// A decoded scalar value.
///
/// The union is closed: every known tag has a variant, and foreign tags
/// ride through `Unknown` byte-for-byte so newer server-side types never
/// fail to decode or re-encode.
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleValue {
    Null,
    /// Travels as 8 big-endian bytes regardless of sign; negative values
    /// wrap through the unsigned wire form and wrap back on decode.
    Integer(i64),
    Double(f64),
    /// Carries a trailing NUL on the wire; all trailing NULs are stripped
    /// on decode.
    String(String),
    Blob(Bytes),
    /// Pass-through for tags this client does not understand, and for
    /// known tags whose payload does not parse.
    Unknown { tag: u8, data: Bytes },
}

impl ParticleValue {
    /// Wire tag for this value.
    pub fn particle_type(&self) -> u8 {
        match self {
            ParticleValue::Null => PARTICLE_NULL,
            ParticleValue::Integer(_) => PARTICLE_INTEGER,
            ParticleValue::Double(_) => PARTICLE_DOUBLE,
            ParticleValue::String(_) => PARTICLE_STRING,
            ParticleValue::Blob(_) => PARTICLE_BLOB,
            ParticleValue::Unknown { tag, .. } => *tag,
        }
    }

    /// Encodes the payload bytes.
    pub fn encode(&self) -> Bytes {
        match self {
            ParticleValue::Null => Bytes::new(),
            ParticleValue::Integer(value) => {
                Bytes::copy_from_slice(&(*value as u64).to_be_bytes())
            }
            ParticleValue::Double(value) => Bytes::copy_from_slice(&value.to_be_bytes()),
            ParticleValue::String(text) => {
                let mut buf = BytesMut::with_capacity(text.len() + 1);
                buf.put_slice(text.as_bytes());
                buf.put_u8(0);
                buf.freeze()
            }
            ParticleValue::Blob(data) => data.clone(),
            ParticleValue::Unknown { data, .. } => data.clone(),
        }
    }

    /// Decodes a tagged payload.
    ///
    /// Total by construction: a short integer or double payload, or
    /// non-UTF-8 string bytes, come back as `Unknown` rather than an
    /// error, and `Unknown` re-encodes to the identical bytes.
    pub fn decode(tag: u8, data: Bytes) -> ParticleValue {
        match tag {
            PARTICLE_NULL => ParticleValue::Null,
            PARTICLE_INTEGER if data.len() >= 8 => {
                let raw = u64::from_be_bytes(data[..8].try_into().unwrap());
                ParticleValue::Integer(raw as i64)
            }
            PARTICLE_DOUBLE if data.len() >= 8 => {
                ParticleValue::Double(f64::from_be_bytes(data[..8].try_into().unwrap()))
            }
            PARTICLE_STRING => match std::str::from_utf8(&data) {
                Ok(text) => ParticleValue::String(text.trim_end_matches('\0').to_string()),
                Err(_) => ParticleValue::Unknown { tag, data },
            },
            PARTICLE_BLOB => ParticleValue::Blob(data),
            _ => ParticleValue::Unknown { tag, data },
        }
    }
}

impl fmt::Display for ParticleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticleValue::Null => write!(f, "null"),
            ParticleValue::Integer(value) => write!(f, "{}", value),
            ParticleValue::Double(value) => write!(f, "{}", value),
            ParticleValue::String(text) => write!(f, "{}", text),
            ParticleValue::Blob(data) => write!(f, "<{} byte blob>", data.len()),
            ParticleValue::Unknown { tag, data } => {
                write!(f, "<particle type {}, {} bytes>", tag, data.len())
            }
        }
    }
}

impl From<i64> for ParticleValue {
    fn from(value: i64) -> Self {
        ParticleValue::Integer(value)
    }
}

impl From<i32> for ParticleValue {
    fn from(value: i32) -> Self {
        ParticleValue::Integer(value as i64)
    }
}

impl From<f64> for ParticleValue {
    fn from(value: f64) -> Self {
        ParticleValue::Double(value)
    }
}

impl From<&str> for ParticleValue {
    fn from(value: &str) -> Self {
        ParticleValue::String(value.to_string())
    }
}

impl From<String> for ParticleValue {
    fn from(value: String) -> Self {
        ParticleValue::String(value)
    }
}

impl From<Vec<u8>> for ParticleValue {
    fn from(value: Vec<u8>) -> Self {
        ParticleValue::Blob(Bytes::from(value))
    }
}

impl From<&[u8]> for ParticleValue {
    fn from(value: &[u8]) -> Self {
        ParticleValue::Blob(Bytes::copy_from_slice(value))
    }
}
