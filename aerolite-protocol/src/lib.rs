//! # aerolite-protocol
//!
//! Wire protocol implementation for the Aerospike node protocol.
//!
//! This crate provides:
//! - Outer envelope framing (8-byte version/type/size header)
//! - Record message serialization: fixed header, locator fields, bin operations
//! - Particle encoding for typed scalar values
//! - RIPEMD-160 record key digests
//! - Text info request/response helpers
//! - Server result codes and the retry policy state machine
//!
//! Everything here is pure computation over byte buffers. No I/O happens in
//! this crate, so all of it is safe to call from any thread or task.

pub mod digest;
pub mod error;
pub mod frame;
pub mod info;
pub mod message;
pub mod particle;
pub mod policy;

pub use digest::{hash_key, DIGEST_SIZE};
pub use error::{FrameDefect, ProtocolError, ResultCode};
pub use frame::{pack_frame, unpack_frame, FrameHeader, MessageType, FRAME_HEADER_SIZE};
pub use message::{Field, MsgHeader, Operation, RecordMessage, MSG_HEADER_SIZE};
pub use particle::ParticleValue;
pub use policy::{ExchangeState, RetryPolicy};

/// Protocol version carried in the first byte of every frame.
pub const PROTOCOL_VERSION: u8 = 2;

/// Default port an Aerospike node listens on.
pub const DEFAULT_PORT: u16 = 3000;

/// Largest payload the 48-bit frame size field can describe.
pub const MAX_PAYLOAD_SIZE: u64 = (1 << 48) - 1;
