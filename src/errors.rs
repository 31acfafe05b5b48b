use thiserror::Error;

/// All errors that can occur while opening or saving a database.
///
/// The four load/save failure kinds are deliberately coarse: a caller needs
/// to tell "this file isn't ours" from "wrong password or corrupt file" from
/// "well-formed ciphertext, malformed plaintext" from "I/O failure while
/// saving" — and nothing finer.
#[derive(Debug, Error)]
pub enum KdbError {
    /// The header signature matched neither supported dialect.  Raised
    /// before any key derivation or decryption is attempted.
    #[error("Unknown file format — signature matches no supported dialect")]
    UnknownFileFormat,

    /// The ciphertext decrypted but failed an integrity check (content hash
    /// mismatch, padding failure, or authentication-tag failure).  This is
    /// also what a wrong password looks like.
    #[error("File corrupted or wrong password: {0}")]
    FileCorrupted(&'static str),

    /// The decrypted plaintext does not match the expected structural
    /// grammar.  Distinct from `FileCorrupted`: the ciphertext verified,
    /// the content inside did not.
    #[error("Parsing failed: {0}")]
    ParsingFailed(String),

    /// Serialization or flush failure on the save path.  The previously
    /// valid on-disk file is left untouched.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Key derivation was handed inputs it cannot work with (e.g. a seed of
    /// the wrong length).  Never raised for keyfile *content* — malformed
    /// keyfiles degrade to raw-byte hashing instead.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// The input stream failed mid-read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KdbError>;
