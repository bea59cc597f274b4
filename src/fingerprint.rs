//! # Fingerprint
//! Content digest used as the dedup key for activities.
//!
//! Canonical form: compact JSON, object keys sorted byte-wise at every depth,
//! arrays kept in order, numbers in serde_json's shortest round-trip format.
//! The digest is the lowercase hex SHA-256 of those bytes (64 chars).
//!
//! Changing any of the above invalidates every digest already held by a
//! running listener, so treat the format as frozen.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::EncodingError;

/// Length of a digest string produced by [`fingerprint`].
pub const DIGEST_LEN: usize = 64;

/// Hash any serializable value into its dedup digest.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodingError> {
    let bytes = canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Deterministic byte encoding of `value`. Also used as the published message body.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let tree = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(512);
    write_canonical(&tree, &mut out)?;
    Ok(out)
}

fn write_canonical(v: &Value, out: &mut Vec<u8>) -> Result<(), EncodingError> {
    match v {
        Value::Object(map) => {
            // Do not rely on Map iteration order: it follows insertion order
            // whenever serde_json's `preserve_order` gets enabled in the graph.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (k, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, k)?;
                out.push(b':');
                write_canonical(val, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}
