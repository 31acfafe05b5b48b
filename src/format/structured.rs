//! Structured dialect: TLV header, AES-256-GCM body, optionally
//! gzip-compressed JSON document.
//!
//! After the shared 8-byte signature and a version word, the header is a
//! run of `(field id: u8, size: u16, data)` triples closed by an end
//! field.  The body is a single GCM ciphertext; its authentication tag is
//! the integrity check, so "wrong password" and "tampered ciphertext" are
//! both `FileCorrupted` before a single plaintext byte is looked at.
//! Anything wrong *inside* a successfully authenticated body — bad gzip
//! stream, malformed JSON, duplicate UUIDs — is `ParsingFailed` instead.
//!
//! Unknown JSON fields on groups and entries are captured into a flattened
//! map and written back on save, so files from newer writers round-trip
//! without loss.

use std::collections::HashSet;
use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, cipher, kdf};
use crate::errors::{KdbError, Result};
use crate::key::KeyMaterial;
use crate::tree::{GroupId, HistorySnapshot, Times, Tree};

use super::{Dialect, SIG_1, SIG_2_STRUCTURED, SIG_LEN};

const VERSION: u32 = 0x0001_0000;

const HEADER_FIELD_END: u8 = 0;
const HEADER_FIELD_COMMENT: u8 = 1;
const HEADER_FIELD_COMPRESSION: u8 = 3;
const HEADER_FIELD_MASTER_SEED: u8 = 4;
const HEADER_FIELD_TRANSFORM_SEED: u8 = 5;
const HEADER_FIELD_ROUNDS: u8 = 6;
const HEADER_FIELD_NONCE: u8 = 7;

const COMPRESSION_NONE: u32 = 0;
const COMPRESSION_GZIP: u32 = 1;

/// Hard ceiling on the decompressed body, so a hostile gzip stream cannot
/// balloon memory (256 MiB).
const MAX_BODY_LEN: u64 = 256 * 1024 * 1024;

const MASTER_SEED_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub fn decode(data: &[u8], key: &KeyMaterial) -> Result<Tree> {
    let (header, body_start) = Header::parse(data)?;

    let final_key = kdf::derive_final_key(
        key,
        Dialect::Structured,
        &header.master_seed,
        &header.transform_seed,
        header.rounds,
    )?;
    let plaintext = cipher::decrypt_gcm(final_key.as_bytes(), &header.nonce, &data[body_start..])?;

    let json = match header.compression {
        COMPRESSION_NONE => plaintext,
        COMPRESSION_GZIP => decompress(&plaintext)?,
        _ => unreachable!("validated during header parse"),
    };

    let document: Document = serde_json::from_slice(&json)
        .map_err(|e| KdbError::ParsingFailed(format!("body JSON: {e}")))?;
    build_tree(document)
}

fn decompress(compressed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::new());
    let n = GzDecoder::new(compressed)
        .take(MAX_BODY_LEN + 1)
        .read_to_end(&mut out)
        .map_err(|e| KdbError::ParsingFailed(format!("gzip stream: {e}")))?;
    if n as u64 > MAX_BODY_LEN {
        return Err(KdbError::ParsingFailed(
            "decompressed body exceeds size limit".into(),
        ));
    }
    Ok(out)
}

fn build_tree(document: Document) -> Result<Tree> {
    let mut tree = Tree::new();
    let mut seen = HashSet::new();

    let root = tree.root();
    attach_group(&mut tree, root, document.root, &mut seen)?;
    tree.reset_min_version();
    Ok(tree)
}

/// Apply a group record onto an existing (root or freshly created) group
/// and recurse.  The `can_add_entries` flag is applied *after* the
/// record's entries are attached: a file claiming "no entries" for a group
/// that contains some is tolerated rather than rejected.
fn attach_group(
    tree: &mut Tree,
    id: GroupId,
    rec: GroupRecord,
    seen: &mut HashSet<Uuid>,
) -> Result<()> {
    {
        let group = tree.group_mut(id).expect("group minted in this pass");
        group.name = rec.name;
        group.icon = rec.icon;
        group.times = rec.times;
        group.unknown_fields = rec.unknown;
    }

    for entry_rec in rec.entries {
        if !seen.insert(entry_rec.uuid) {
            return Err(KdbError::ParsingFailed(format!(
                "duplicate entry uuid {}",
                entry_rec.uuid
            )));
        }
        let e = tree
            .create_entry_with_uuid(id, entry_rec.uuid)
            .map_err(|e| KdbError::ParsingFailed(format!("inconsistent document: {e}")))?;
        let entry = tree.entry_mut(e).expect("entry minted in this pass");
        entry.icon = entry_rec.icon;
        entry.times = entry_rec.times;
        entry.title = entry_rec.title;
        entry.username = entry_rec.username;
        // Direct assignment: `set_password` stamps a new modification
        // time, but decoded timestamps must stay the file's own.
        entry.password = Zeroizing::new(entry_rec.password);
        entry.url = entry_rec.url;
        entry.notes = entry_rec.notes;
        entry.custom_fields = entry_rec
            .custom_fields
            .into_iter()
            .map(|f| (f.key, f.value))
            .collect();
        entry.history = entry_rec.history.into_iter().map(HistoryRecord::into_snapshot).collect();
        entry.custom_icon = entry_rec.custom_icon;
        entry.unknown_fields = entry_rec.unknown;
    }

    for child in rec.groups {
        let child_id = tree
            .create_group(id)
            .map_err(|e| KdbError::ParsingFailed(format!("inconsistent document: {e}")))?;
        attach_group(tree, child_id, child, seen)?;
    }

    tree.group_mut(id).expect("group minted in this pass").can_add_entries =
        rec.can_add_entries;
    Ok(())
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub fn encode(tree: &Tree, key: &KeyMaterial) -> Result<Vec<u8>> {
    let document = Document {
        meta: Meta {
            generator: concat!("kdbvault ", env!("CARGO_PKG_VERSION")).to_string(),
        },
        root: group_record(tree, tree.root()),
    };
    let json = Zeroizing::new(
        serde_json::to_vec(&document)
            .map_err(|e| KdbError::WriteFailed(format!("body JSON: {e}")))?,
    );
    let compressed = compress(&json)?;

    let master_seed: [u8; MASTER_SEED_LEN] = cipher::random_bytes()?;
    let transform_seed: [u8; crypto::TRANSFORM_SEED_LEN] = cipher::random_bytes()?;
    let nonce: [u8; crypto::GCM_NONCE_LEN] = cipher::random_bytes()?;
    let rounds = kdf::DEFAULT_TRANSFORM_ROUNDS;

    let final_key =
        kdf::derive_final_key(key, Dialect::Structured, &master_seed, &transform_seed, rounds)?;
    let ciphertext = cipher::encrypt_gcm(final_key.as_bytes(), &nonce, &compressed)?;

    let mut out = Vec::with_capacity(SIG_LEN + 96 + ciphertext.len());
    out.extend_from_slice(&SIG_1.to_le_bytes());
    out.extend_from_slice(&SIG_2_STRUCTURED.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    write_header_field(&mut out, HEADER_FIELD_COMPRESSION, &COMPRESSION_GZIP.to_le_bytes());
    write_header_field(&mut out, HEADER_FIELD_MASTER_SEED, &master_seed);
    write_header_field(&mut out, HEADER_FIELD_TRANSFORM_SEED, &transform_seed);
    write_header_field(&mut out, HEADER_FIELD_ROUNDS, &rounds.to_le_bytes());
    write_header_field(&mut out, HEADER_FIELD_NONCE, &nonce);
    write_header_field(&mut out, HEADER_FIELD_END, &[]);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn compress(plaintext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(plaintext)
        .and_then(|_| encoder.finish())
        .map(Zeroizing::new)
        .map_err(|e| KdbError::WriteFailed(format!("gzip stream: {e}")))
}

fn group_record(tree: &Tree, id: GroupId) -> GroupRecord {
    let group = tree.group(id).expect("group id from this tree");
    GroupRecord {
        name: group.name.clone(),
        icon: group.icon,
        times: group.times.clone(),
        can_add_entries: group.can_add_entries,
        groups: group
            .groups()
            .iter()
            .map(|&child| group_record(tree, child))
            .collect(),
        entries: group
            .entries()
            .iter()
            .map(|&e| {
                let entry = tree.entry(e).expect("entry id from this tree");
                EntryRecord {
                    uuid: entry.uuid(),
                    icon: entry.icon,
                    times: entry.times.clone(),
                    title: entry.title.clone(),
                    username: entry.username.clone(),
                    password: entry.password().to_string(),
                    url: entry.url.clone(),
                    notes: entry.notes.clone(),
                    custom_fields: entry
                        .custom_fields()
                        .iter()
                        .map(|(k, v)| FieldRecord {
                            key: k.clone(),
                            value: v.clone(),
                        })
                        .collect(),
                    history: entry.history().iter().map(HistoryRecord::from_snapshot).collect(),
                    custom_icon: entry.custom_icon(),
                    unknown: entry.unknown_fields().clone(),
                }
            })
            .collect(),
        unknown: group.unknown_fields().clone(),
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

struct Header {
    compression: u32,
    master_seed: Vec<u8>,
    transform_seed: Vec<u8>,
    rounds: u64,
    nonce: Vec<u8>,
}

impl Header {
    /// Parse the TLV header; returns the header and the body offset.
    ///
    /// Header malformations are `FileCorrupted`: the file cannot even be
    /// keyed, let alone parsed.  Unknown header field ids are skipped for
    /// forward compatibility.
    fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut pos = SIG_LEN + 4; // signatures + version word
        if data.len() < pos {
            return Err(KdbError::FileCorrupted("file too short for header"));
        }

        let mut compression = COMPRESSION_NONE;
        let mut master_seed = None;
        let mut transform_seed = None;
        let mut rounds = None;
        let mut nonce = None;

        loop {
            if data.len() - pos < 3 {
                return Err(KdbError::FileCorrupted("truncated header field"));
            }
            let id = data[pos];
            let size = u16::from_le_bytes(data[pos + 1..pos + 3].try_into().unwrap()) as usize;
            pos += 3;
            if data.len() - pos < size {
                return Err(KdbError::FileCorrupted("header field size exceeds input"));
            }
            let field = &data[pos..pos + size];
            pos += size;

            match id {
                HEADER_FIELD_END => break,
                HEADER_FIELD_COMMENT => {}
                HEADER_FIELD_COMPRESSION => {
                    let bytes: [u8; 4] = field
                        .try_into()
                        .map_err(|_| KdbError::FileCorrupted("bad compression field"))?;
                    compression = u32::from_le_bytes(bytes);
                    if compression > COMPRESSION_GZIP {
                        return Err(KdbError::FileCorrupted("unsupported compression"));
                    }
                }
                HEADER_FIELD_MASTER_SEED => master_seed = Some(field.to_vec()),
                HEADER_FIELD_TRANSFORM_SEED => transform_seed = Some(field.to_vec()),
                HEADER_FIELD_ROUNDS => {
                    let bytes: [u8; 8] = field
                        .try_into()
                        .map_err(|_| KdbError::FileCorrupted("bad rounds field"))?;
                    rounds = Some(u64::from_le_bytes(bytes));
                }
                HEADER_FIELD_NONCE => nonce = Some(field.to_vec()),
                // Forward compatibility: newer writers may add header
                // fields we do not know.
                _ => {}
            }
        }

        let header = Self {
            compression,
            master_seed: master_seed
                .ok_or(KdbError::FileCorrupted("header missing master seed"))?,
            transform_seed: transform_seed
                .ok_or(KdbError::FileCorrupted("header missing transform seed"))?,
            rounds: rounds.ok_or(KdbError::FileCorrupted("header missing round count"))?,
            nonce: nonce.ok_or(KdbError::FileCorrupted("header missing nonce"))?,
        };
        if header.master_seed.len() != MASTER_SEED_LEN {
            return Err(KdbError::FileCorrupted("bad master seed length"));
        }
        if header.transform_seed.len() != crypto::TRANSFORM_SEED_LEN {
            return Err(KdbError::FileCorrupted("bad transform seed length"));
        }
        if header.nonce.len() != crypto::GCM_NONCE_LEN {
            return Err(KdbError::FileCorrupted("bad nonce length"));
        }
        Ok((header, pos))
    }
}

fn write_header_field(out: &mut Vec<u8>, id: u8, data: &[u8]) {
    out.push(id);
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

// ---------------------------------------------------------------------------
// Body document
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    meta: Meta,
    root: GroupRecord,
}

#[derive(Serialize, Deserialize, Default)]
struct Meta {
    #[serde(default)]
    generator: String,
}

#[derive(Serialize, Deserialize)]
struct GroupRecord {
    name: String,
    #[serde(default)]
    icon: u32,
    times: Times,
    #[serde(default = "default_true")]
    can_add_entries: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    groups: Vec<GroupRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<EntryRecord>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct EntryRecord {
    uuid: Uuid,
    #[serde(default)]
    icon: u32,
    times: Times,
    #[serde(default)]
    title: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    notes: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    custom_fields: Vec<FieldRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_icon: Option<Uuid>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct FieldRecord {
    key: String,
    value: String,
}

#[derive(Serialize, Deserialize)]
struct HistoryRecord {
    title: String,
    username: String,
    password: String,
    url: String,
    notes: String,
    modified: DateTime<Utc>,
}

impl HistoryRecord {
    fn from_snapshot(s: &HistorySnapshot) -> Self {
        Self {
            title: s.title.clone(),
            username: s.username.clone(),
            password: s.password().to_string(),
            url: s.url.clone(),
            notes: s.notes.clone(),
            modified: s.modified,
        }
    }

    fn into_snapshot(self) -> HistorySnapshot {
        HistorySnapshot {
            title: self.title,
            username: self.username,
            password: Zeroizing::new(self.password),
            url: self.url,
            notes: self.notes,
            modified: self.modified,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        let g = tree.create_group(tree.root()).unwrap();
        tree.group_mut(g).unwrap().name = "work".into();
        let e = tree.create_entry(g).unwrap();
        {
            let entry = tree.entry_mut(e).unwrap();
            entry.title = "vpn".into();
            entry.username = "bob".into();
            entry.set_password("p@ss");
        }
        tree.set_custom_field(e, "PIN", "1234").unwrap();
        tree.record_history(e).unwrap();
        tree
    }

    #[test]
    fn roundtrip_preserves_structured_features() {
        let key = KeyMaterial::from_password("hunter2");
        let bytes = encode(&sample_tree(), &key).unwrap();
        let tree = decode(&bytes, &key).unwrap();

        let root = tree.group(tree.root()).unwrap();
        let g = tree.group(root.groups()[0]).unwrap();
        assert_eq!(g.name, "work");

        let entry = tree.entry(g.entries()[0]).unwrap();
        assert_eq!(entry.title, "vpn");
        assert_eq!(entry.password(), "p@ss");
        assert_eq!(entry.custom_fields(), &[("PIN".to_string(), "1234".to_string())]);
        assert_eq!(entry.history().len(), 1);
        assert_eq!(tree.min_version(), Dialect::Structured);
    }

    #[test]
    fn decoded_timestamps_are_the_files_not_now() {
        let key = KeyMaterial::from_password("pw");
        let mut tree = sample_tree();
        let e = tree.iter_entries().next().unwrap();
        let past = DateTime::from_timestamp(1_000_000_000, 0).unwrap();
        tree.entry_mut(e).unwrap().times.modified = past;

        let bytes = encode(&tree, &key).unwrap();
        let decoded = decode(&bytes, &key).unwrap();
        let e2 = decoded.iter_entries().next().unwrap();
        assert_eq!(decoded.entry(e2).unwrap().times.modified, past);
    }

    #[test]
    fn loaded_tree_without_structured_features_has_legacy_floor() {
        let mut tree = Tree::new();
        let g = tree.create_group(tree.root()).unwrap();
        tree.create_entry(g).unwrap();

        let key = KeyMaterial::from_password("pw");
        let bytes = encode(&tree, &key).unwrap();
        let decoded = decode(&bytes, &key).unwrap();
        assert_eq!(decoded.min_version(), Dialect::Legacy);
    }

    #[test]
    fn wrong_password_fails_before_any_parsing() {
        let bytes = encode(&sample_tree(), &KeyMaterial::from_password("hunter2")).unwrap();
        let result = decode(&bytes, &KeyMaterial::from_password("wrong"));
        assert!(matches!(result, Err(KdbError::FileCorrupted(_))));
    }

    #[test]
    fn malformed_body_is_parsing_failed_not_corrupted() {
        // Authenticated ciphertext over garbage plaintext: integrity
        // passes, grammar does not.
        let key = KeyMaterial::from_password("pw");
        let master_seed = [1u8; MASTER_SEED_LEN];
        let transform_seed = [2u8; crypto::TRANSFORM_SEED_LEN];
        let nonce = [3u8; crypto::GCM_NONCE_LEN];
        let final_key =
            kdf::derive_final_key(&key, Dialect::Structured, &master_seed, &transform_seed, 60)
                .unwrap();
        let ciphertext =
            cipher::encrypt_gcm(final_key.as_bytes(), &nonce, b"this is not json").unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&SIG_1.to_le_bytes());
        data.extend_from_slice(&SIG_2_STRUCTURED.to_le_bytes());
        data.extend_from_slice(&VERSION.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_COMPRESSION, &COMPRESSION_NONE.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_MASTER_SEED, &master_seed);
        write_header_field(&mut data, HEADER_FIELD_TRANSFORM_SEED, &transform_seed);
        write_header_field(&mut data, HEADER_FIELD_ROUNDS, &60u64.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_NONCE, &nonce);
        write_header_field(&mut data, HEADER_FIELD_END, &[]);
        data.extend_from_slice(&ciphertext);

        let result = decode(&data, &key);
        assert!(matches!(result, Err(KdbError::ParsingFailed(_))));
    }

    #[test]
    fn missing_header_field_is_corrupted() {
        let mut data = Vec::new();
        data.extend_from_slice(&SIG_1.to_le_bytes());
        data.extend_from_slice(&SIG_2_STRUCTURED.to_le_bytes());
        data.extend_from_slice(&VERSION.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_END, &[]);

        let result = decode(&data, &KeyMaterial::from_password("pw"));
        assert!(matches!(result, Err(KdbError::FileCorrupted(_))));
    }

    #[test]
    fn short_transform_seed_is_corrupted_before_derivation() {
        let mut data = Vec::new();
        data.extend_from_slice(&SIG_1.to_le_bytes());
        data.extend_from_slice(&SIG_2_STRUCTURED.to_le_bytes());
        data.extend_from_slice(&VERSION.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_MASTER_SEED, &[1u8; MASTER_SEED_LEN]);
        write_header_field(&mut data, HEADER_FIELD_TRANSFORM_SEED, &[2u8; 16]);
        write_header_field(&mut data, HEADER_FIELD_ROUNDS, &60u64.to_le_bytes());
        write_header_field(&mut data, HEADER_FIELD_NONCE, &[3u8; crypto::GCM_NONCE_LEN]);
        write_header_field(&mut data, HEADER_FIELD_END, &[]);

        let result = decode(&data, &KeyMaterial::from_password("pw"));
        assert!(matches!(result, Err(KdbError::FileCorrupted(_))));
    }

    #[test]
    fn unknown_json_fields_round_trip() {
        // Simulate a file from a newer writer by injecting an extra field
        // into an entry record.
        let key = KeyMaterial::from_password("pw");
        let mut tree = sample_tree();
        let e = tree.iter_entries().next().unwrap();
        tree.entry_mut(e)
            .unwrap()
            .unknown_fields
            .insert("autotype_sequence".into(), Value::String("{USER}{TAB}".into()));

        let bytes = encode(&tree, &key).unwrap();
        let decoded = decode(&bytes, &key).unwrap();
        let e2 = decoded.iter_entries().next().unwrap();
        assert_eq!(
            decoded.entry(e2).unwrap().unknown_fields().get("autotype_sequence"),
            Some(&Value::String("{USER}{TAB}".into()))
        );

        // And they keep the floor raised.
        assert_eq!(decoded.min_version(), Dialect::Structured);
    }

    #[test]
    fn duplicate_uuid_is_parsing_failed() {
        let key = KeyMaterial::from_password("pw");
        let mut tree = Tree::new();
        let g = tree.create_group(tree.root()).unwrap();
        tree.create_entry(g).unwrap();
        let bytes = encode(&tree, &key).unwrap();

        // Decode, then re-encode a document with the entry duplicated.
        let decoded = decode(&bytes, &key).unwrap();
        let mut rec = group_record(&decoded, decoded.root());
        let dup = rec.groups[0].entries[0].uuid;
        rec.groups[0].entries.push(EntryRecord {
            uuid: dup,
            icon: 0,
            times: Times::now(),
            title: String::new(),
            username: String::new(),
            password: String::new(),
            url: String::new(),
            notes: String::new(),
            custom_fields: Vec::new(),
            history: Vec::new(),
            custom_icon: None,
            unknown: Map::new(),
        });
        let document = Document {
            meta: Meta::default(),
            root: rec,
        };
        let result = build_tree(document);
        assert!(matches!(result, Err(KdbError::ParsingFailed(_))));
    }
}
