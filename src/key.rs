//! User-supplied key material: a password plus an optional keyfile.
//!
//! `KeyMaterial` is what callers hand to `load`/`save`.  The password is
//! kept together with the text encoding it should be interpreted under,
//! because the hash that seeds key derivation runs over the *encoded*
//! bytes — two encodings of the same string produce different keys.

use zeroize::{Zeroize, Zeroizing};

use crate::errors::{KdbError, Result};

/// Text encoding applied to the password before hashing.
///
/// Legacy files written by older clients commonly used Latin-1 or UTF-16LE;
/// everything modern uses UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordEncoding {
    Utf8,
    Latin1,
    Utf16Le,
}

/// Password + optional keyfile, the inputs to key derivation.
pub struct KeyMaterial {
    password: Zeroizing<String>,
    encoding: PasswordEncoding,
    keyfile: Option<Zeroizing<Vec<u8>>>,
}

impl KeyMaterial {
    /// Key material from a UTF-8 password alone.
    pub fn from_password(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            encoding: PasswordEncoding::Utf8,
            keyfile: None,
        }
    }

    /// Key material with an explicit password encoding.
    pub fn with_encoding(password: &str, encoding: PasswordEncoding) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            encoding,
            keyfile: None,
        }
    }

    /// Attach keyfile bytes as a second factor.  The bytes are interpreted
    /// by `crypto::keyfile` at derivation time.
    pub fn with_keyfile(mut self, keyfile_bytes: Vec<u8>) -> Self {
        self.keyfile = Some(Zeroizing::new(keyfile_bytes));
        self
    }

    /// The password encoded to the byte form key derivation hashes.
    ///
    /// Latin-1 maps chars above U+00FF to an error rather than silently
    /// mangling them — a password that cannot be represented in the
    /// declared encoding can never have produced the stored key.
    pub fn password_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = match self.encoding {
            PasswordEncoding::Utf8 => self.password.as_bytes().to_vec(),
            PasswordEncoding::Latin1 => {
                let mut out = Vec::with_capacity(self.password.len());
                for c in self.password.chars() {
                    let code = c as u32;
                    if code > 0xFF {
                        return Err(KdbError::KeyDerivation(format!(
                            "password contains character U+{code:04X}, not representable in Latin-1"
                        )));
                    }
                    out.push(code as u8);
                }
                out
            }
            PasswordEncoding::Utf16Le => self
                .password
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes())
                .collect(),
        };
        Ok(Zeroizing::new(bytes))
    }

    /// Raw keyfile bytes, if a keyfile was attached.
    pub fn keyfile_bytes(&self) -> Option<&[u8]> {
        self.keyfile.as_deref().map(|v| v.as_slice())
    }
}

/// Length of the final cipher key (256 bits).
pub const FINAL_KEY_LEN: usize = 32;

/// The derived cipher key, zeroed when dropped.
///
/// Scoped to a single load or save call — the codec derives it, uses it,
/// and drops it.  It must never be cached across operations.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct FinalKey {
    bytes: [u8; FINAL_KEY_LEN],
}

impl FinalKey {
    pub(crate) fn new(bytes: [u8; FINAL_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to build a cipher).
    pub fn as_bytes(&self) -> &[u8; FINAL_KEY_LEN] {
        &self.bytes
    }
}
