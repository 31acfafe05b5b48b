//! Core engine for an encrypted, hierarchical password database.
//!
//! A database file is opened by deriving a cipher key from the user's
//! password (and optional keyfile) plus salts stored in the file header,
//! decrypting the body with it, and parsing the result into a mutable
//! [`Tree`] of groups and entries.  Saving is the inverse: the tree is
//! serialized, encrypted under freshly generated seeds, and written out
//! as header + ciphertext.
//!
//! Two on-disk dialects are supported and selected automatically from the
//! signature bytes: a legacy fixed-layout binary format and a newer
//! structured format.  A tree remembers the *minimum dialect version* its
//! content requires, so saving never silently downgrades a file (see
//! [`Tree::min_version`]).
//!
//! ```no_run
//! use kdbvault::{load_bytes, save, KeyMaterial};
//!
//! # fn main() -> Result<(), kdbvault::KdbError> {
//! let data = std::fs::read("passwords.kdb")?;
//! let key = KeyMaterial::from_password("hunter2");
//!
//! let mut tree = load_bytes(&data, &key)?;
//! let group = tree.create_group(tree.root()).unwrap();
//! let entry = tree.create_entry(group).unwrap();
//! tree.entry_mut(entry).unwrap().title = "bank".into();
//!
//! let bytes = save(&tree, &key)?;
//! # Ok(())
//! # }
//! ```
//!
//! Everything is synchronous and single-threaded by contract: `load` and
//! `save` block, share no state between calls, and leave concurrency to
//! the caller.

pub mod crypto;
pub mod errors;
pub mod format;
pub mod key;
pub mod tree;

pub use errors::{KdbError, Result};
pub use format::{load, load_bytes, save, save_as, save_to_path, Dialect};
pub use key::{KeyMaterial, PasswordEncoding};
pub use tree::{Entry, EntryId, Group, GroupId, Times, Tree, TreeError};
