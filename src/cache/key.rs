//! Cache keys and content fingerprints.
//!
//! Both are SHA-256 digests, hex encoded. SHA-256 is stable across
//! processes and builds, unlike `DefaultHasher`, so keys stay valid if the
//! cache is ever persisted or shared.
//!
//! The key covers the whole record: `id`, the content fields and the
//! serialized metadata, so an edited record never lands on its old entry.
//! The fingerprint covers content alone (`signature`, `summary`,
//! `snippet`) and is what lookup validation compares against.

use sha2::{Digest, Sha256};

use crate::types::WorkRecord;
use crate::Result;

/// Derive the cache key for a record.
///
/// Fails only if the metadata map cannot be serialized.
pub fn cache_key(record: &WorkRecord) -> Result<String> {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, record.id.as_bytes());
    update_content(&mut hasher, record);
    match &record.metadata {
        Some(meta) => update_field(&mut hasher, &serde_json::to_vec(meta)?),
        None => hasher.update([0u8]),
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash over the content fields of a record.
pub fn content_fingerprint(record: &WorkRecord) -> String {
    let mut hasher = Sha256::new();
    update_content(&mut hasher, record);
    format!("{:x}", hasher.finalize())
}

fn update_content(hasher: &mut Sha256, record: &WorkRecord) {
    update_field(hasher, record.signature.as_bytes());
    update_field(hasher, record.summary.as_bytes());
    match &record.snippet {
        Some(snippet) => update_field(hasher, snippet.as_bytes()),
        None => hasher.update([0u8]),
    }
}

/// Length-prefixed so that ("ab", "c") and ("a", "bc") hash differently.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update([1u8]);
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
