//! Final-key derivation: password + keyfile → composite key → seeded
//! round transform → master-seed hash.
//!
//! The round transform is the brute-force-slowing step: the composite key
//! is AES-256-encrypted in place, round-count times, keyed by the per-file
//! transform seed.  The round count comes from the file header so attackers
//! cannot assume a fixed work factor; it is never hardcoded on the load
//! path.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{KdbError, Result};
use crate::format::Dialect;
use crate::key::{FinalKey, KeyMaterial, FINAL_KEY_LEN};

use super::{keyfile, DIGEST_LEN, TRANSFORM_SEED_LEN};

/// Round count written into the header of newly created files.
pub const DEFAULT_TRANSFORM_ROUNDS: u64 = 6000;

/// Derive the final cipher key for one load or save operation.
///
/// The dialect picks the composite-key rule (legacy files have historical
/// quirks, see [`composite_key`]); seeds and round count come from the file
/// header.  A wrong password is *not* detectable here — it only surfaces
/// when the decrypted body fails its integrity check.
pub fn derive_final_key(
    key: &KeyMaterial,
    dialect: Dialect,
    master_seed: &[u8],
    transform_seed: &[u8],
    rounds: u64,
) -> Result<FinalKey> {
    let mut composite = composite_key(key, dialect)?;
    transform_rounds(&mut composite, transform_seed, rounds)?;

    let stretched: Zeroizing<[u8; DIGEST_LEN]> =
        Zeroizing::new(Sha256::digest(composite.as_slice()).into());

    let mut hasher = Sha256::new();
    hasher.update(master_seed);
    hasher.update(stretched.as_slice());
    let digest = hasher.finalize();

    let mut bytes = [0u8; FINAL_KEY_LEN];
    bytes.copy_from_slice(&digest);
    Ok(FinalKey::new(bytes))
}

/// Combine the password digest and keyfile key into one 32-byte composite.
///
/// Structured files always hash the concatenation of whatever components
/// are present.  Legacy files carry two quirks from the original format:
/// a password without a keyfile is used as its bare SHA-256, and a keyfile
/// without a password (empty password string) contributes its key verbatim.
fn composite_key(key: &KeyMaterial, dialect: Dialect) -> Result<Zeroizing<[u8; DIGEST_LEN]>> {
    let password = key.password_bytes()?;
    let password_digest: Zeroizing<[u8; DIGEST_LEN]> =
        Zeroizing::new(Sha256::digest(password.as_slice()).into());
    let keyfile_key = key.keyfile_bytes().map(keyfile::keyfile_key);

    let mut out = Zeroizing::new([0u8; DIGEST_LEN]);
    match dialect {
        Dialect::Legacy => match keyfile_key {
            None => out.copy_from_slice(password_digest.as_slice()),
            Some(kf) if password.is_empty() => out.copy_from_slice(kf.as_slice()),
            Some(kf) => {
                let mut hasher = Sha256::new();
                hasher.update(password_digest.as_slice());
                hasher.update(kf.as_slice());
                out.copy_from_slice(&hasher.finalize());
            }
        },
        Dialect::Structured => {
            let mut hasher = Sha256::new();
            hasher.update(password_digest.as_slice());
            if let Some(kf) = keyfile_key {
                hasher.update(kf.as_slice());
            }
            out.copy_from_slice(&hasher.finalize());
        }
    }
    Ok(out)
}

/// AES-256-encrypt both halves of the composite key in place, `rounds`
/// times, keyed by the transform seed.
fn transform_rounds(composite: &mut [u8; DIGEST_LEN], seed: &[u8], rounds: u64) -> Result<()> {
    if seed.len() != TRANSFORM_SEED_LEN {
        return Err(KdbError::KeyDerivation(format!(
            "transform seed must be {TRANSFORM_SEED_LEN} bytes, got {}",
            seed.len()
        )));
    }

    let cipher = Aes256::new_from_slice(seed)
        .map_err(|e| KdbError::KeyDerivation(format!("invalid transform key: {e}")))?;

    let (left, right) = composite.split_at_mut(16);
    let left = GenericArray::from_mut_slice(left);
    let right = GenericArray::from_mut_slice(right);
    for _ in 0..rounds {
        cipher.encrypt_block(left);
        cipher.encrypt_block(right);
    }
    Ok(())
}
