//! Body ciphers for the two dialects.
//!
//! The legacy dialect encrypts its record stream with AES-256-CBC and
//! relies on a header content hash for integrity.  The structured dialect
//! uses AES-256-GCM, whose authentication tag plays the integrity role —
//! a wrong key or a flipped ciphertext bit both fail tag verification.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::TryRngCore;
use zeroize::Zeroizing;

use crate::errors::{KdbError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt a legacy record stream with AES-256-CBC / PKCS#7.
pub fn encrypt_cbc(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| KdbError::WriteFailed(format!("invalid CBC key/IV length: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt a legacy record stream.
///
/// A padding failure here almost always means a wrong final key, so it is
/// reported as `FileCorrupted` like any other integrity break.
pub fn decrypt_cbc(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| KdbError::FileCorrupted("invalid CBC key/IV length"))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| KdbError::FileCorrupted("CBC padding check failed"))?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a structured body with AES-256-GCM.  The nonce is stored in the
/// file header, not prepended to the ciphertext.
pub fn encrypt_gcm(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| KdbError::WriteFailed(format!("invalid GCM key length: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| KdbError::WriteFailed(format!("encryption error: {e}")))
}

/// Decrypt and authenticate a structured body.
pub fn decrypt_gcm(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| KdbError::FileCorrupted("invalid GCM key length"))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KdbError::FileCorrupted("authentication tag mismatch"))?;
    Ok(Zeroizing::new(plaintext))
}

/// Fresh random bytes for seeds, IVs, and nonces.  Only the save path
/// generates randomness, so RNG failure maps to `WriteFailed`.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| KdbError::WriteFailed(format!("OS random generator unavailable: {e}")))?;
    Ok(buf)
}
