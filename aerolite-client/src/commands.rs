//! Builders for the record message behind each client verb.
//!
//! These produce exactly the field and operation lists the node expects;
//! the exchange engine in [`crate::connection`] does the rest. They are
//! shared by the async and blocking clients.

use aerolite_protocol::digest::DIGEST_SIZE;
use aerolite_protocol::message::{
    Field, Operation, RecordMessage, INFO1_BATCH, INFO1_GET_ALL, INFO1_NOBINDATA, INFO1_READ,
    INFO2_DELETE, INFO2_WRITE,
};
use aerolite_protocol::particle::ParticleValue;

fn key_fields(namespace: &str, set: &str, key: &str) -> Vec<Field> {
    vec![
        Field::namespace(namespace),
        Field::set_name(set),
        Field::key(key),
    ]
}

/// Read the named bins, or the whole record when `bins` is empty.
pub fn read_command(namespace: &str, set: &str, key: &str, bins: &[&str]) -> RecordMessage {
    let mut info1 = INFO1_READ;
    if bins.is_empty() {
        info1 |= INFO1_GET_ALL;
    }
    RecordMessage::new(info1, 0, 0)
        .with_fields(key_fields(namespace, set, key))
        .with_ops(bins.iter().map(|bin| Operation::read(bin)))
}

/// Probe for existence without pulling bin data over the wire.
pub fn exists_command(namespace: &str, set: &str, key: &str) -> RecordMessage {
    RecordMessage::new(INFO1_READ | INFO1_NOBINDATA, 0, 0)
        .with_fields(key_fields(namespace, set, key))
}

/// Write every given bin. A `record_ttl` of zero keeps the namespace
/// default expiration.
pub fn write_command(
    namespace: &str,
    set: &str,
    key: &str,
    bins: &[(&str, ParticleValue)],
    record_ttl: u32,
) -> RecordMessage {
    RecordMessage::new(0, INFO2_WRITE, 0)
        .with_record_ttl(record_ttl)
        .with_fields(key_fields(namespace, set, key))
        .with_ops(bins.iter().map(|(name, value)| Operation::write(name, value)))
}

/// Delete the whole record.
pub fn delete_command(namespace: &str, set: &str, key: &str) -> RecordMessage {
    RecordMessage::new(0, INFO2_WRITE | INFO2_DELETE, 0)
        .with_fields(key_fields(namespace, set, key))
}

/// Apply explicit modify operations (incr, append, prepend, touch).
pub fn operate_command(
    namespace: &str,
    set: &str,
    key: &str,
    ops: Vec<Operation>,
) -> RecordMessage {
    RecordMessage::new(0, INFO2_WRITE, 0)
        .with_fields(key_fields(namespace, set, key))
        .with_ops(ops)
}

/// Batch-read whole records by digest, in request order.
pub fn batch_read_command(namespace: &str, digests: &[[u8; DIGEST_SIZE]]) -> RecordMessage {
    RecordMessage::new(INFO1_READ | INFO1_GET_ALL | INFO1_BATCH, 0, 0)
        .with_field(Field::namespace(namespace))
        .with_field(Field::digest_array(digests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolite_protocol::message::{
        FIELD_DIGEST_RIPE_ARRAY, FIELD_KEY, FIELD_NAMESPACE, FIELD_SET, OP_INCR, OP_READ,
        OP_TOUCH, OP_WRITE,
    };

    #[test]
    fn test_read_command_all_bins() {
        let message = read_command("test", "demo", "k1", &[]);
        assert_eq!(message.header.info1, INFO1_READ | INFO1_GET_ALL);
        assert_eq!(message.header.info2, 0);
        assert!(message.ops.is_empty());

        let types: Vec<u8> = message.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![FIELD_NAMESPACE, FIELD_SET, FIELD_KEY]);
        assert_eq!(message.fields[2].data.as_ref(), b"\x03k1");
    }

    #[test]
    fn test_read_command_named_bins() {
        let message = read_command("test", "demo", "k1", &["a", "b"]);
        assert_eq!(message.header.info1, INFO1_READ);
        assert_eq!(message.ops.len(), 2);
        assert!(message.ops.iter().all(|op| op.op == OP_READ));
        assert_eq!(message.ops[0].name, "a");
    }

    #[test]
    fn test_exists_command_requests_no_bin_data() {
        let message = exists_command("test", "demo", "k1");
        assert_eq!(message.header.info1, INFO1_READ | INFO1_NOBINDATA);
        assert!(message.ops.is_empty());
    }

    #[test]
    fn test_write_command() {
        let bins = [
            ("name", ParticleValue::from("ada")),
            ("age", ParticleValue::from(36)),
        ];
        let message = write_command("test", "demo", "k1", &bins, 3600);
        assert_eq!(message.header.info2, INFO2_WRITE);
        assert_eq!(message.header.record_ttl, 3600);
        assert_eq!(message.ops.len(), 2);
        assert!(message.ops.iter().all(|op| op.op == OP_WRITE));
        assert_eq!(message.ops[1].particle_type, 1);
    }

    #[test]
    fn test_delete_command_flags() {
        let message = delete_command("test", "demo", "k1");
        assert_eq!(message.header.info1, 0);
        assert_eq!(message.header.info2, INFO2_WRITE | INFO2_DELETE);
        assert!(message.ops.is_empty());
    }

    #[test]
    fn test_operate_command_carries_ops() {
        let message = operate_command(
            "test",
            "demo",
            "k1",
            vec![Operation::incr("hits", 2), Operation::touch()],
        );
        assert_eq!(message.header.info2, INFO2_WRITE);
        assert_eq!(message.ops[0].op, OP_INCR);
        assert_eq!(message.ops[1].op, OP_TOUCH);
    }

    #[test]
    fn test_batch_read_command() {
        let digests = [[0xAAu8; DIGEST_SIZE], [0xBBu8; DIGEST_SIZE]];
        let message = batch_read_command("test", &digests);
        assert_eq!(
            message.header.info1,
            INFO1_READ | INFO1_GET_ALL | INFO1_BATCH
        );
        assert_eq!(message.fields.len(), 2);
        assert_eq!(message.fields[0].field_type, FIELD_NAMESPACE);
        assert_eq!(message.fields[1].field_type, FIELD_DIGEST_RIPE_ARRAY);
        assert_eq!(message.fields[1].data.len(), 2 * DIGEST_SIZE);
    }
}
