//! Record key digests.
//!
//! The server locates records by a 20-byte RIPEMD-160 digest rather than
//! by the raw key. Single-record requests carry the raw key and let the
//! server hash it; batch requests ship digests directly, so the client
//! computes the same hash the server would.

use crate::message::KEY_TYPE_STRING;
use ripemd::{Digest, Ripemd160};

/// Width of a record digest in bytes.
pub const DIGEST_SIZE: usize = 20;

/// Computes the digest locating a record: RIPEMD-160 over the set name,
/// the string key-type tag, and the key, with no length prefixes or
/// separators between them.
pub fn hash_key(set: &str, key: &str) -> [u8; DIGEST_SIZE] {
    let mut hasher = Ripemd160::new();
    hasher.update(set.as_bytes());
    hasher.update([KEY_TYPE_STRING]);
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}
