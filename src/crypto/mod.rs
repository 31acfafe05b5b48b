//! Cryptographic primitives for the database engine.
//!
//! This module provides:
//! - the composite/final key derivation pipeline (`kdf`)
//! - keyfile interpretation with the raw-byte fallback (`keyfile`)
//! - AES-256-CBC and AES-256-GCM body ciphers (`cipher`)

pub mod cipher;
pub mod kdf;
pub mod keyfile;

pub use cipher::{decrypt_cbc, decrypt_gcm, encrypt_cbc, encrypt_gcm, random_bytes};
pub use kdf::{derive_final_key, DEFAULT_TRANSFORM_ROUNDS};
pub use keyfile::keyfile_key;

/// Length of the AES-CBC initialization vector (16 bytes).
pub const CBC_IV_LEN: usize = 16;
/// Length of the AES-GCM nonce (12 bytes).
pub const GCM_NONCE_LEN: usize = 12;
/// Length of the transform seed, which doubles as an AES-256 key.
pub const TRANSFORM_SEED_LEN: usize = 32;
/// Length of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;
