// src/store/fingerprint.rs

use blake3::Hasher;
use tracing::trace;

use crate::types::ScriptId;

/// Compute the identifier of a script from its text.
///
/// The id is the blake3 digest of the raw bytes, hex encoded and truncated
/// to [`crate::types::SCRIPT_ID_LEN`] characters.
pub fn fingerprint(text: &str) -> ScriptId {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    let id = ScriptId::from_digest(hex.as_str());
    trace!(id = %id, bytes = text.len(), "computed script fingerprint");
    id
}
