//! On-disk format handling: dialect selection, codecs, and the load/save
//! facade.
//!
//! Both dialects open with the same 8 signature bytes (a shared first
//! word, then a dialect-specific second word).  The facade reads only
//! those signatures to pick a codec — no key derivation or decryption
//! happens before the dialect is known.

pub mod legacy;
pub mod structured;

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::errors::{KdbError, Result};
use crate::key::KeyMaterial;
use crate::tree::Tree;

/// Shared first signature word.
pub const SIG_1: u32 = 0x9AA2_D903;
/// Second signature word for the legacy binary dialect.
pub const SIG_2_LEGACY: u32 = 0xB54B_FB65;
/// Second signature word for the structured dialect.
pub const SIG_2_STRUCTURED: u32 = 0xB54B_FB67;

/// Length of the signature prefix the facade sniffs.
pub const SIG_LEN: usize = 8;

/// One on-disk format generation.
///
/// Ordered: `Legacy < Structured`, so a tree's minimum version can be
/// compared against a requested save dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dialect {
    /// Fixed-layout binary header, AES-CBC body, flat record stream.
    Legacy,
    /// TLV header, AES-GCM body, optionally compressed JSON document.
    Structured,
}

/// Inspect the signature prefix and name the dialect, without touching
/// anything past the first 8 bytes.
pub fn sniff(data: &[u8]) -> Result<Dialect> {
    if data.len() < SIG_LEN {
        return Err(KdbError::UnknownFileFormat);
    }
    let sig1 = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let sig2 = u32::from_le_bytes(data[4..8].try_into().unwrap());
    if sig1 != SIG_1 {
        return Err(KdbError::UnknownFileFormat);
    }
    match sig2 {
        SIG_2_LEGACY => Ok(Dialect::Legacy),
        SIG_2_STRUCTURED => Ok(Dialect::Structured),
        _ => Err(KdbError::UnknownFileFormat),
    }
}

/// Read an encrypted database from a byte stream and decode it.
///
/// The stream is drained into memory first: both dialects need the whole
/// buffer anyway (the legacy content hash and the structured
/// authentication tag cover the full body).
pub fn load<R: Read>(reader: &mut R, key: &KeyMaterial) -> Result<Tree> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    load_bytes(&data, key)
}

/// Decode an encrypted database already held in memory.
pub fn load_bytes(data: &[u8], key: &KeyMaterial) -> Result<Tree> {
    let dialect = sniff(data)?;
    debug!(?dialect, len = data.len(), "decoding database");
    match dialect {
        Dialect::Legacy => legacy::decode(data, key),
        Dialect::Structured => structured::decode(data, key),
    }
}

/// Encode a tree into header + encrypted body bytes.
///
/// The dialect is the tree's own minimum version, so content that only
/// the structured dialect can represent is never silently downgraded.
pub fn save(tree: &Tree, key: &KeyMaterial) -> Result<Vec<u8>> {
    save_as(tree, key, tree.min_version())
}

/// Encode with an explicit dialect.  Requesting a dialect below the
/// tree's minimum version is refused rather than lossy.
pub fn save_as(tree: &Tree, key: &KeyMaterial, dialect: Dialect) -> Result<Vec<u8>> {
    if dialect < tree.min_version() {
        return Err(KdbError::WriteFailed(format!(
            "{dialect:?} dialect cannot represent this tree (minimum is {:?})",
            tree.min_version()
        )));
    }
    debug!(?dialect, "encoding database");
    match dialect {
        Dialect::Legacy => legacy::encode(tree, key),
        Dialect::Structured => structured::encode(tree, key),
    }
}

/// Encode and write to `path` atomically.
///
/// The bytes go to a temp file in the same directory first, then a rename
/// replaces the target, so a failure at any point leaves a previously
/// valid file untouched.
pub fn save_to_path(tree: &Tree, key: &KeyMaterial, path: &Path) -> Result<()> {
    let bytes = save(tree, key)?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &bytes)
        .map_err(|e| KdbError::WriteFailed(format!("temp file write: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        KdbError::WriteFailed(format!("atomic rename: {e}"))
    })?;
    Ok(())
}
