//! The record shape handed back to callers.

use aerolite_protocol::message::{RecordMessage, FIELD_DIGEST_RIPE};
use aerolite_protocol::particle::ParticleValue;
use bytes::Bytes;
use std::collections::HashMap;

/// A record as callers see it: decoded bin values plus the header
/// metadata worth keeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Write counter maintained by the server.
    pub generation: u32,
    /// Seconds until expiration as reported by the server.
    pub ttl: u32,
    /// Digest locator, when the reply carried one (batch replies do).
    pub digest: Option<Bytes>,
    /// False only for the soft not-found slots of a batch reply.
    pub found: bool,
    /// Bin name to decoded particle value.
    pub bins: HashMap<String, ParticleValue>,
}

impl From<RecordMessage> for Record {
    fn from(message: RecordMessage) -> Self {
        let digest = message
            .fields
            .iter()
            .find(|field| field.field_type == FIELD_DIGEST_RIPE)
            .map(|field| field.data.clone());
        let found = message.header.result_code.is_ok();

        let mut bins = HashMap::with_capacity(message.ops.len());
        for op in message.ops {
            bins.insert(op.name, ParticleValue::decode(op.particle_type, op.data));
        }

        Record {
            generation: message.header.generation,
            ttl: message.header.record_ttl,
            digest,
            found,
            bins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolite_protocol::message::{Field, Operation, INFO3_LAST, OP_WRITE};
    use aerolite_protocol::ResultCode;

    #[test]
    fn test_bins_decode_by_particle_type() {
        let message = RecordMessage::new(0, 0, 0)
            .with_generation(4)
            .with_record_ttl(120)
            .with_op(Operation::write("name", &ParticleValue::from("ada")))
            .with_op(Operation::write("age", &ParticleValue::Integer(36)));

        // run the ops through the wire form so decode sees raw payloads
        let mut bytes = message.encode().unwrap().freeze();
        let record: Record = RecordMessage::decode(&mut bytes).unwrap().into();

        assert_eq!(record.generation, 4);
        assert_eq!(record.ttl, 120);
        assert!(record.found);
        assert!(record.digest.is_none());
        assert_eq!(record.bins["name"], ParticleValue::String("ada".to_string()));
        assert_eq!(record.bins["age"], ParticleValue::Integer(36));
    }

    #[test]
    fn test_digest_field_is_surfaced() {
        let message = RecordMessage::new(0, 0, 0)
            .with_field(Field::digest([0x5Au8; 20]))
            .with_op(Operation::new(OP_WRITE, 1, "n", Bytes::from_static(&[0u8; 8])));
        let record: Record = message.into();
        assert_eq!(record.digest.as_deref(), Some(&[0x5Au8; 20][..]));
    }

    #[test]
    fn test_not_found_batch_slot() {
        let mut message = RecordMessage::new(0, 0, INFO3_LAST);
        message.header.result_code = ResultCode::KEY_NOT_FOUND;
        let record: Record = message.into();
        assert!(!record.found);
        assert!(record.bins.is_empty());
    }

    #[test]
    fn test_unknown_particles_survive() {
        let message = RecordMessage::new(0, 0, 0).with_op(Operation::new(
            OP_WRITE,
            19,
            "mystery",
            Bytes::from_static(&[1, 2, 3]),
        ));
        let record: Record = message.into();
        assert_eq!(
            record.bins["mystery"],
            ParticleValue::Unknown {
                tag: 19,
                data: Bytes::from_static(&[1, 2, 3])
            }
        );
    }
}
