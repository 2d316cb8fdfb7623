//! Record messages: the binary payload behind
//! [`MessageType::Message`](crate::frame::MessageType::Message) frames.
//!
//! Layout (no delimiters; counts in the header and per-element sizes
//! locate everything):
//!
//! ```text
//! +-----------+-----------+-----------+-----------+----------+-------------+
//! | header_sz | info1     | info2     | info3     | (unused) | result_code |
//! | 1 byte    | 1 byte    | 1 byte    | 1 byte    | 1 byte   | 1 byte      |
//! +-----------+-----------+-----------+-----------+----------+-------------+
//! | generation            | record_ttl            | transaction_ttl        |
//! | 4 bytes               | 4 bytes               | 4 bytes                |
//! +-----------------------+-----------+-----------+------------------------+
//! | n_fields  | n_ops     | fields... | operations...                      |
//! | 2 bytes   | 2 bytes   |           |                                    |
//! +-----------+-----------+-----------+------------------------------------+
//!
//! field:     size(4, = payload+1) type(1) payload
//! operation: size(4, = 4+name+data) op(1) particle_type(1) version(1)
//!            name_len(1) name data
//! ```
//!
//! All integers are big-endian. Batch replies concatenate several record
//! messages inside one frame payload; [`RecordMessage::decode`] consumes
//! one message and leaves the rest in the buffer.

use crate::digest::DIGEST_SIZE;
use crate::error::{ProtocolError, ResultCode};
use crate::particle::ParticleValue;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed record message header in bytes.
pub const MSG_HEADER_SIZE: usize = 22;

/// Key-type tag leading every string key payload (and digest preimage).
pub const KEY_TYPE_STRING: u8 = 0x03;

// info1 bits: read-side behavior of a request.
pub const INFO1_READ: u8 = 0x01;
pub const INFO1_GET_ALL: u8 = 0x02;
pub const INFO1_BATCH: u8 = 0x08;
pub const INFO1_XDR: u8 = 0x10;
pub const INFO1_NOBINDATA: u8 = 0x20;

// info2 bits: write-side behavior.
pub const INFO2_WRITE: u8 = 0x01;
pub const INFO2_DELETE: u8 = 0x02;
pub const INFO2_GENERATION: u8 = 0x04;
pub const INFO2_GENERATION_GT: u8 = 0x08;
pub const INFO2_CREATE_ONLY: u8 = 0x20;

// info3 bits: reply stream control.
pub const INFO3_LAST: u8 = 0x01;

// Locator field types.
pub const FIELD_NAMESPACE: u8 = 0;
pub const FIELD_SET: u8 = 1;
pub const FIELD_KEY: u8 = 2;
pub const FIELD_BIN: u8 = 3;
pub const FIELD_DIGEST_RIPE: u8 = 4;
pub const FIELD_DIGEST_RIPE_ARRAY: u8 = 6;
pub const FIELD_TRID: u8 = 7;
pub const FIELD_SCAN_OPTIONS: u8 = 8;

// Bin operation codes.
pub const OP_READ: u8 = 1;
pub const OP_WRITE: u8 = 2;
pub const OP_INCR: u8 = 5;
pub const OP_APPEND: u8 = 9;
pub const OP_PREPEND: u8 = 10;
pub const OP_TOUCH: u8 = 11;
// Legacy memcache-compatible codes; decoded like any other, never sent.
pub const OP_MC_INCR: u8 = 129;
pub const OP_MC_APPEND: u8 = 130;
pub const OP_MC_PREPEND: u8 = 131;
pub const OP_MC_TOUCH: u8 = 132;

/// Fixed header of a record message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Header length as written on the wire; 22 for everything we emit.
    pub header_sz: u8,
    pub info1: u8,
    pub info2: u8,
    pub info3: u8,
    pub result_code: ResultCode,
    pub generation: u32,
    pub record_ttl: u32,
    pub transaction_ttl: u32,
    pub n_fields: u16,
    pub n_ops: u16,
}

impl MsgHeader {
    /// True when this message closes a streaming batch reply.
    pub fn is_last(&self) -> bool {
        self.info3 & INFO3_LAST != 0
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(MSG_HEADER_SIZE as u8);
        buf.put_u8(self.info1);
        buf.put_u8(self.info2);
        buf.put_u8(self.info3);
        buf.put_u8(0); // unused
        buf.put_u8(self.result_code.to_wire());
        buf.put_u32(self.generation);
        buf.put_u32(self.record_ttl);
        buf.put_u32(self.transaction_ttl);
        buf.put_u16(self.n_fields);
        buf.put_u16(self.n_ops);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.len() < MSG_HEADER_SIZE {
            return Err(ProtocolError::TruncatedPayload {
                needed: MSG_HEADER_SIZE,
                available: buf.len(),
            });
        }

        let header_sz = buf.get_u8();
        let info1 = buf.get_u8();
        let info2 = buf.get_u8();
        let info3 = buf.get_u8();
        let _unused = buf.get_u8();
        let result_code = ResultCode::from_wire(buf.get_u8());
        let generation = buf.get_u32();
        let record_ttl = buf.get_u32();
        let transaction_ttl = buf.get_u32();
        let n_fields = buf.get_u16();
        let n_ops = buf.get_u16();

        Ok(Self {
            header_sz,
            info1,
            info2,
            info3,
            result_code,
            generation,
            record_ttl,
            transaction_ttl,
            n_fields,
            n_ops,
        })
    }
}

/// A locator field: a typed payload addressing namespace, set, key or
/// digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub field_type: u8,
    pub data: Bytes,
}

impl Field {
    pub fn new(field_type: u8, data: impl Into<Bytes>) -> Self {
        Self {
            field_type,
            data: data.into(),
        }
    }

    /// Namespace locator.
    pub fn namespace(name: &str) -> Self {
        Self::new(FIELD_NAMESPACE, Bytes::copy_from_slice(name.as_bytes()))
    }

    /// Set locator.
    pub fn set_name(name: &str) -> Self {
        Self::new(FIELD_SET, Bytes::copy_from_slice(name.as_bytes()))
    }

    /// Primary key locator; the payload leads with the string key-type tag.
    pub fn key(key: &str) -> Self {
        let mut data = BytesMut::with_capacity(key.len() + 1);
        data.put_u8(KEY_TYPE_STRING);
        data.put_slice(key.as_bytes());
        Self::new(FIELD_KEY, data.freeze())
    }

    /// Single 20-byte record digest.
    pub fn digest(digest: [u8; DIGEST_SIZE]) -> Self {
        Self::new(FIELD_DIGEST_RIPE, Bytes::copy_from_slice(&digest))
    }

    /// Concatenated digests for a batch request, in request order.
    pub fn digest_array(digests: &[[u8; DIGEST_SIZE]]) -> Self {
        let mut data = BytesMut::with_capacity(digests.len() * DIGEST_SIZE);
        for digest in digests {
            data.put_slice(digest);
        }
        Self::new(FIELD_DIGEST_RIPE_ARRAY, data.freeze())
    }

    /// On-wire size including the 5-byte element header.
    fn wire_size(&self) -> usize {
        4 + 1 + self.data.len()
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.data.len() as u32 + 1);
        buf.put_u8(self.field_type);
        buf.put_slice(&self.data);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.len() < 5 {
            return Err(ProtocolError::TruncatedPayload {
                needed: 5,
                available: buf.len(),
            });
        }

        // size covers the type byte plus the payload
        let size = buf.get_u32() as usize;
        if size < 1 {
            return Err(ProtocolError::TruncatedPayload {
                needed: 1,
                available: 0,
            });
        }
        if buf.len() < size {
            return Err(ProtocolError::TruncatedPayload {
                needed: size,
                available: buf.len(),
            });
        }

        let field_type = buf.get_u8();
        let data = buf.copy_to_bytes(size - 1);
        Ok(Self { field_type, data })
    }
}

/// A bin operation: an op code applied to a named bin with a particle
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub op: u8,
    pub particle_type: u8,
    pub name: String,
    pub data: Bytes,
}

impl Operation {
    pub fn new(op: u8, particle_type: u8, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            op,
            particle_type,
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read one bin; the server fills in the particle.
    pub fn read(name: &str) -> Self {
        Self::new(OP_READ, 0, name, Bytes::new())
    }

    /// Write one bin.
    pub fn write(name: &str, value: &ParticleValue) -> Self {
        Self::new(OP_WRITE, value.particle_type(), name, value.encode())
    }

    /// Add `delta` to an integer bin.
    pub fn incr(name: &str, delta: i64) -> Self {
        let value = ParticleValue::Integer(delta);
        Self::new(OP_INCR, value.particle_type(), name, value.encode())
    }

    /// Append to a string or blob bin.
    pub fn append(name: &str, value: &ParticleValue) -> Self {
        Self::new(OP_APPEND, value.particle_type(), name, value.encode())
    }

    /// Prepend to a string or blob bin.
    pub fn prepend(name: &str, value: &ParticleValue) -> Self {
        Self::new(OP_PREPEND, value.particle_type(), name, value.encode())
    }

    /// Refresh the record TTL without touching any bin.
    pub fn touch() -> Self {
        Self::new(OP_TOUCH, 0, "", Bytes::new())
    }

    /// On-wire size including the 8-byte element header.
    fn wire_size(&self) -> usize {
        4 + 4 + self.name.len() + self.data.len()
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let name_len = self.name.len();
        if name_len > u8::MAX as usize {
            return Err(ProtocolError::BinNameTooLong(name_len));
        }

        buf.put_u32((4 + name_len + self.data.len()) as u32);
        buf.put_u8(self.op);
        buf.put_u8(self.particle_type);
        buf.put_u8(0); // bin version, unused
        buf.put_u8(name_len as u8);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(&self.data);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.len() < 8 {
            return Err(ProtocolError::TruncatedPayload {
                needed: 8,
                available: buf.len(),
            });
        }

        // size covers op, particle type, version, name length, name, data
        let size = buf.get_u32() as usize;
        if size < 4 {
            return Err(ProtocolError::TruncatedPayload {
                needed: 4,
                available: size,
            });
        }
        if buf.len() < size {
            return Err(ProtocolError::TruncatedPayload {
                needed: size,
                available: buf.len(),
            });
        }

        let op = buf.get_u8();
        let particle_type = buf.get_u8();
        let _version = buf.get_u8();
        let name_len = buf.get_u8() as usize;
        if size < 4 + name_len {
            return Err(ProtocolError::TruncatedPayload {
                needed: 4 + name_len,
                available: size,
            });
        }

        let name_bytes = buf.copy_to_bytes(name_len);
        let name = std::str::from_utf8(&name_bytes)
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        let data = buf.copy_to_bytes(size - 4 - name_len);

        Ok(Self {
            op,
            particle_type,
            name,
            data,
        })
    }
}

/// One complete record message: header plus its fields and operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMessage {
    pub header: MsgHeader,
    pub fields: Vec<Field>,
    pub ops: Vec<Operation>,
}

impl RecordMessage {
    /// Starts a request message. Generation and both TTLs default to zero.
    pub fn new(info1: u8, info2: u8, info3: u8) -> Self {
        Self {
            header: MsgHeader {
                header_sz: MSG_HEADER_SIZE as u8,
                info1,
                info2,
                info3,
                result_code: ResultCode::OK,
                generation: 0,
                record_ttl: 0,
                transaction_ttl: 0,
                n_fields: 0,
                n_ops: 0,
            },
            fields: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Sets the expected generation (pair with [`INFO2_GENERATION`]).
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.header.generation = generation;
        self
    }

    /// Sets the record TTL in seconds; zero keeps the namespace default.
    pub fn with_record_ttl(mut self, ttl: u32) -> Self {
        self.header.record_ttl = ttl;
        self
    }

    /// Sets the server-side transaction deadline in milliseconds.
    pub fn with_transaction_ttl(mut self, ttl: u32) -> Self {
        self.header.transaction_ttl = ttl;
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_op(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    pub fn with_ops(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.ops.extend(ops);
        self
    }

    /// Serializes a request. The element counts come from the field and
    /// operation lists; the result code is forced to zero because requests
    /// never carry one.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        self.encode_with(ResultCode::OK)
    }

    /// Serializes preserving `header.result_code`: the reply side of the
    /// codec, used by servers and by test harnesses scripting replies.
    pub fn encode_reply(&self) -> Result<BytesMut, ProtocolError> {
        self.encode_with(self.header.result_code)
    }

    fn encode_with(&self, result_code: ResultCode) -> Result<BytesMut, ProtocolError> {
        if self.fields.len() > u16::MAX as usize {
            return Err(ProtocolError::TooManyFields(self.fields.len()));
        }
        if self.ops.len() > u16::MAX as usize {
            return Err(ProtocolError::TooManyOps(self.ops.len()));
        }

        let mut size = MSG_HEADER_SIZE;
        for field in &self.fields {
            size += field.wire_size();
        }
        for op in &self.ops {
            size += op.wire_size();
        }

        let mut buf = BytesMut::with_capacity(size);
        let header = MsgHeader {
            header_sz: MSG_HEADER_SIZE as u8,
            result_code,
            n_fields: self.fields.len() as u16,
            n_ops: self.ops.len() as u16,
            ..self.header
        };
        header.encode_into(&mut buf);

        for field in &self.fields {
            field.encode_into(&mut buf);
        }
        for op in &self.ops {
            op.encode_into(&mut buf)?;
        }
        Ok(buf)
    }

    /// Consumes one record message from the front of `buf`, leaving any
    /// concatenated follow-on messages in place.
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let header = MsgHeader::decode(buf)?;

        let mut fields = Vec::with_capacity(header.n_fields as usize);
        for _ in 0..header.n_fields {
            fields.push(Field::decode(buf)?);
        }

        let mut ops = Vec::with_capacity(header.n_ops as usize);
        for _ in 0..header.n_ops {
            ops.push(Operation::decode(buf)?);
        }

        Ok(Self {
            header,
            fields,
            ops,
        })
    }
}
