//! Keyfile interpretation.
//!
//! A keyfile contributes a 32-byte key to the composite.  Recognized
//! shapes, checked in order:
//!
//! 1. Exactly 32 raw bytes — used verbatim.
//! 2. Exactly 64 hex characters — decoded.
//! 3. A JSON envelope (`{"meta": {...}, "key": {"data": "<base64>"}}`)
//!    whose `data` decodes to 32 bytes — the embedded key is used directly.
//! 4. Anything else, *including malformed envelopes*: SHA-256 of the raw
//!    file bytes.
//!
//! The fourth case is a compatibility fallback, not an error: files keyed
//! with an arbitrary blob must stay openable with that same blob.  If the
//! body later fails its integrity check the load reports `FileCorrupted`;
//! keyfile interpretation itself never fails.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

use super::DIGEST_LEN;

/// JSON keyfile envelope.  `meta` is accepted and ignored.
#[derive(Deserialize)]
struct KeyfileEnvelope {
    key: KeyfileKey,
}

#[derive(Deserialize)]
struct KeyfileKey {
    /// Base64 of the 32-byte key.
    data: String,
}

/// Reduce keyfile bytes to the 32-byte key they contribute.
pub fn keyfile_key(bytes: &[u8]) -> Zeroizing<[u8; DIGEST_LEN]> {
    let mut out = Zeroizing::new([0u8; DIGEST_LEN]);

    if bytes.len() == DIGEST_LEN {
        out.copy_from_slice(bytes);
        return out;
    }

    if bytes.len() == DIGEST_LEN * 2 {
        if let Some(decoded) = decode_hex(bytes) {
            *out = decoded;
            return out;
        }
    }

    if bytes.trim_ascii_start().starts_with(b"{") {
        match envelope_key(bytes) {
            Some(key) => {
                *out = key;
                return out;
            }
            None => {
                warn!("malformed structured keyfile, falling back to raw-byte hashing");
            }
        }
    }

    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

fn envelope_key(bytes: &[u8]) -> Option<[u8; DIGEST_LEN]> {
    let envelope: KeyfileEnvelope = serde_json::from_slice(bytes).ok()?;
    let decoded = BASE64.decode(envelope.key.data.as_bytes()).ok()?;
    decoded.try_into().ok()
}

fn decode_hex(bytes: &[u8]) -> Option<[u8; DIGEST_LEN]> {
    let mut out = [0u8; DIGEST_LEN];
    for (i, pair) in bytes.chunks(2).enumerate() {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out[i] = (hi as u8) << 4 | lo as u8;
    }
    Some(out)
}
