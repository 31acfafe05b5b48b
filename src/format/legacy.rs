//! Legacy binary dialect: fixed 124-byte header, AES-256-CBC body,
//! flat field/length/value record stream.
//!
//! Header layout:
//!
//! ```text
//! [sig1: 4][sig2: 4][flags: 4][version: 4]
//! [master seed: 16][encryption IV: 16]
//! [group count: 4][entry count: 4]
//! [content hash: 32][transform seed: 32][rounds: 4]
//! ```
//!
//! The body is a sequence of group records followed by entry records,
//! each a run of `(field id: u16, size: u32, data)` triples closed by the
//! `0xFFFF` terminator field.  Group nesting is encoded by a level field
//! (depth below the root); entries name their parent group by its numeric
//! id.  The root group itself has no record — which is why root-level
//! entries are a structured-only feature.
//!
//! Unknown field ids are skipped, not fatal.  This dialect does **not**
//! round-trip unknown fields: a legacy file written by a newer client
//! loses those fields on re-save here.  That tradeoff is accepted (and
//! differs from the structured dialect, which preserves them).

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, cipher, kdf};
use crate::errors::{KdbError, Result};
use crate::key::KeyMaterial;
use crate::tree::{GroupId, Times, Tree, TreeError};

use super::{Dialect, SIG_1, SIG_2_LEGACY};

const HEADER_LEN: usize = 124;
const VERSION: u32 = 0x0003_0000;
/// Header flag bit: body cipher is AES.
const FLAG_AES: u32 = 0x02;

/// Group flag bit: entries may not be attached to this group.
const GROUP_FLAG_NO_ENTRIES: u32 = 0x01;

// Field ids shared by group and entry records.
const FIELD_END: u16 = 0xFFFF;

const GROUP_FIELD_ID: u16 = 0x0001;
const GROUP_FIELD_NAME: u16 = 0x0002;
const GROUP_FIELD_CREATED: u16 = 0x0003;
const GROUP_FIELD_MODIFIED: u16 = 0x0004;
const GROUP_FIELD_ACCESSED: u16 = 0x0005;
const GROUP_FIELD_EXPIRES: u16 = 0x0006;
const GROUP_FIELD_ICON: u16 = 0x0007;
const GROUP_FIELD_LEVEL: u16 = 0x0008;
const GROUP_FIELD_FLAGS: u16 = 0x0009;

const ENTRY_FIELD_UUID: u16 = 0x0001;
const ENTRY_FIELD_GROUP_ID: u16 = 0x0002;
const ENTRY_FIELD_ICON: u16 = 0x0003;
const ENTRY_FIELD_TITLE: u16 = 0x0004;
const ENTRY_FIELD_URL: u16 = 0x0005;
const ENTRY_FIELD_USERNAME: u16 = 0x0006;
const ENTRY_FIELD_PASSWORD: u16 = 0x0007;
const ENTRY_FIELD_NOTES: u16 = 0x0008;
const ENTRY_FIELD_CREATED: u16 = 0x0009;
const ENTRY_FIELD_MODIFIED: u16 = 0x000A;
const ENTRY_FIELD_ACCESSED: u16 = 0x000B;
const ENTRY_FIELD_EXPIRES: u16 = 0x000C;

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub fn decode(data: &[u8], key: &KeyMaterial) -> Result<Tree> {
    if data.len() < HEADER_LEN {
        return Err(KdbError::FileCorrupted("file too short for legacy header"));
    }

    let flags = read_u32(data, 8);
    if flags & FLAG_AES == 0 {
        return Err(KdbError::FileCorrupted("unsupported body cipher"));
    }
    let master_seed = &data[16..32];
    let iv = &data[32..48];
    let group_count = read_u32(data, 48);
    let entry_count = read_u32(data, 52);
    let content_hash = &data[56..88];
    let transform_seed = &data[88..120];
    let rounds = u64::from(read_u32(data, 120));

    let final_key = kdf::derive_final_key(key, Dialect::Legacy, master_seed, transform_seed, rounds)?;
    let plaintext = cipher::decrypt_cbc(final_key.as_bytes(), iv, &data[HEADER_LEN..])?;

    let hash = Sha256::digest(&plaintext);
    if !bool::from(hash.as_slice().ct_eq(content_hash)) {
        return Err(KdbError::FileCorrupted("content hash mismatch"));
    }

    parse_records(&plaintext, group_count, entry_count)
}

fn parse_records(plaintext: &[u8], group_count: u32, entry_count: u32) -> Result<Tree> {
    let mut tree = Tree::new();
    let mut cursor = Cursor::new(plaintext);

    // Deferred `can_add_entries` flags: a tolerated malformation is a
    // group that forbids entries yet contains some, so flags are applied
    // only after every entry is attached.
    let mut no_entry_groups = Vec::new();
    let mut by_file_id: HashMap<u32, GroupId> = HashMap::new();
    // Stack of (level, group) for level-based nesting reconstruction.
    let mut stack: Vec<(u16, GroupId)> = Vec::new();

    for _ in 0..group_count {
        let rec = GroupRecord::parse(&mut cursor)?;

        while stack.last().is_some_and(|&(level, _)| level >= rec.level) {
            stack.pop();
        }
        let parent = match stack.last() {
            Some(&(level, id)) if level.checked_add(1) == Some(rec.level) => id,
            None if rec.level == 0 => tree.root(),
            _ => return Err(KdbError::ParsingFailed("group level out of sequence".into())),
        };

        let id = tree.create_group(parent).map_err(tree_bug)?;
        let group = tree.group_mut(id).expect("freshly created group");
        group.name = rec.name;
        group.icon = rec.icon;
        group.times = rec.times;

        if by_file_id.insert(rec.id, id).is_some() {
            return Err(KdbError::ParsingFailed(format!(
                "duplicate group id {}",
                rec.id
            )));
        }
        if rec.flags & GROUP_FLAG_NO_ENTRIES != 0 {
            no_entry_groups.push(id);
        }
        stack.push((rec.level, id));
    }

    for _ in 0..entry_count {
        let rec = EntryRecord::parse(&mut cursor)?;
        let parent = *by_file_id.get(&rec.group_id).ok_or_else(|| {
            KdbError::ParsingFailed(format!("entry references unknown group {}", rec.group_id))
        })?;

        let id = tree.create_entry_with_uuid(parent, rec.uuid).map_err(tree_bug)?;
        let entry = tree.entry_mut(id).expect("freshly created entry");
        entry.icon = rec.icon;
        entry.times = rec.times;
        entry.title = rec.title;
        entry.username = rec.username;
        // Direct assignment: `set_password` stamps a new modification
        // time, but decoded timestamps must stay the file's own.
        entry.password = rec.password;
        entry.url = rec.url;
        entry.notes = rec.notes;
    }

    if !cursor.at_end() {
        return Err(KdbError::ParsingFailed(
            "trailing bytes after final record".into(),
        ));
    }

    for id in no_entry_groups {
        tree.group_mut(id).expect("group from this parse").can_add_entries = false;
    }
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub fn encode(tree: &Tree, key: &KeyMaterial) -> Result<Vec<u8>> {
    let mut body = Zeroizing::new(Vec::new());

    // Sequential file ids, root excluded: the root has no record in this
    // dialect.
    let mut file_ids: HashMap<GroupId, u32> = HashMap::new();
    let mut group_count: u32 = 0;
    let mut entry_count: u32 = 0;

    for g in tree.iter_groups() {
        if g == tree.root() {
            if !tree.group(g).expect("root").entries().is_empty() {
                return Err(KdbError::WriteFailed(
                    "legacy dialect cannot represent root-level entries".into(),
                ));
            }
            continue;
        }
        group_count += 1;
        file_ids.insert(g, group_count);

        let group = tree.group(g).expect("group from iter_groups");
        // Level 0 is a direct child of the root; `ancestor_depth` counts
        // both the group itself and the root.
        let depth = ancestor_depth(tree, g);
        if depth - 2 > u32::from(u16::MAX) {
            return Err(KdbError::WriteFailed(
                "group nesting too deep for the legacy level field".into(),
            ));
        }
        let level = (depth - 2) as u16;

        write_field(&mut body, GROUP_FIELD_ID, &group_count.to_le_bytes());
        write_string_field(&mut body, GROUP_FIELD_NAME, &group.name);
        write_time_field(&mut body, GROUP_FIELD_CREATED, Some(group.times.created));
        write_time_field(&mut body, GROUP_FIELD_MODIFIED, Some(group.times.modified));
        write_time_field(&mut body, GROUP_FIELD_ACCESSED, Some(group.times.accessed));
        write_time_field(&mut body, GROUP_FIELD_EXPIRES, group.times.expires);
        write_field(&mut body, GROUP_FIELD_ICON, &group.icon.to_le_bytes());
        write_field(&mut body, GROUP_FIELD_LEVEL, &level.to_le_bytes());
        let flags = if group.can_add_entries { 0 } else { GROUP_FLAG_NO_ENTRIES };
        write_field(&mut body, GROUP_FIELD_FLAGS, &u32::to_le_bytes(flags));
        write_field(&mut body, FIELD_END, &[]);
    }

    for e in tree.iter_entries() {
        let entry = tree.entry(e).expect("entry from iter_entries");
        let parent = entry.parent().expect("attached entry");
        let group_id = file_ids[&parent];
        entry_count += 1;

        write_field(&mut body, ENTRY_FIELD_UUID, entry.uuid().as_bytes());
        write_field(&mut body, ENTRY_FIELD_GROUP_ID, &group_id.to_le_bytes());
        write_field(&mut body, ENTRY_FIELD_ICON, &entry.icon.to_le_bytes());
        write_string_field(&mut body, ENTRY_FIELD_TITLE, &entry.title);
        write_string_field(&mut body, ENTRY_FIELD_URL, &entry.url);
        write_string_field(&mut body, ENTRY_FIELD_USERNAME, &entry.username);
        write_string_field(&mut body, ENTRY_FIELD_PASSWORD, entry.password());
        write_string_field(&mut body, ENTRY_FIELD_NOTES, &entry.notes);
        write_time_field(&mut body, ENTRY_FIELD_CREATED, Some(entry.times.created));
        write_time_field(&mut body, ENTRY_FIELD_MODIFIED, Some(entry.times.modified));
        write_time_field(&mut body, ENTRY_FIELD_ACCESSED, Some(entry.times.accessed));
        write_time_field(&mut body, ENTRY_FIELD_EXPIRES, entry.times.expires);
        write_field(&mut body, FIELD_END, &[]);
    }

    let master_seed: [u8; 16] = cipher::random_bytes()?;
    let iv: [u8; crypto::CBC_IV_LEN] = cipher::random_bytes()?;
    let transform_seed: [u8; crypto::TRANSFORM_SEED_LEN] = cipher::random_bytes()?;
    let rounds = kdf::DEFAULT_TRANSFORM_ROUNDS;

    let final_key =
        kdf::derive_final_key(key, Dialect::Legacy, &master_seed, &transform_seed, rounds)?;
    let content_hash = Sha256::digest(body.as_slice());
    let ciphertext = cipher::encrypt_cbc(final_key.as_bytes(), &iv, &body)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(&SIG_1.to_le_bytes());
    out.extend_from_slice(&SIG_2_LEGACY.to_le_bytes());
    out.extend_from_slice(&FLAG_AES.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&master_seed);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&group_count.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&content_hash);
    out.extend_from_slice(&transform_seed);
    out.extend_from_slice(&(rounds as u32).to_le_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Depth of `g` counting the root as 1.
fn ancestor_depth(tree: &Tree, g: GroupId) -> u32 {
    let mut depth = 0u32;
    let mut cursor = Some(g);
    while let Some(id) = cursor {
        depth += 1;
        cursor = tree.group(id).and_then(|group| group.parent());
    }
    depth
}

/// Decoder-side tree operations only fail on decoder bugs (ids are minted
/// in the same pass), except entry attachment rules which the deferred
/// flag handling sidesteps.
fn tree_bug(e: TreeError) -> KdbError {
    KdbError::ParsingFailed(format!("inconsistent record stream: {e}"))
}

// ---------------------------------------------------------------------------
// Field primitives
// ---------------------------------------------------------------------------

fn write_field(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

/// Strings are stored NUL-terminated, matching the original format.
fn write_string_field(out: &mut Vec<u8>, id: u16, s: &str) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&((s.len() + 1) as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Timestamps are u64 unix seconds; zero means "never expires".
fn write_time_field(out: &mut Vec<u8>, id: u16, t: Option<chrono::DateTime<chrono::Utc>>) {
    let secs = t.map_or(0, |t| t.timestamp().max(0) as u64);
    write_field(out, id, &secs.to_le_bytes());
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Bounds-checked reader over the decrypted record stream.  Every length
/// is validated against the remaining input before any slice is taken, so
/// hostile declared sizes fail parsing instead of growing memory.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn next_field(&mut self) -> Result<(u16, &'a [u8])> {
        if self.data.len() - self.pos < 6 {
            return Err(KdbError::ParsingFailed("truncated field header".into()));
        }
        let id = u16::from_le_bytes(self.data[self.pos..self.pos + 2].try_into().unwrap());
        let size = read_u32(self.data, self.pos + 2) as usize;
        self.pos += 6;

        if self.data.len() - self.pos < size {
            return Err(KdbError::ParsingFailed(format!(
                "field size {size} exceeds remaining input"
            )));
        }
        let data = &self.data[self.pos..self.pos + size];
        self.pos += size;
        Ok((id, data))
    }
}

fn parse_string(data: &[u8]) -> Result<String> {
    let trimmed = data
        .strip_suffix(&[0])
        .ok_or_else(|| KdbError::ParsingFailed("string field missing terminator".into()))?;
    String::from_utf8(trimmed.to_vec())
        .map_err(|_| KdbError::ParsingFailed("string field is not valid UTF-8".into()))
}

fn parse_u32(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data
        .try_into()
        .map_err(|_| KdbError::ParsingFailed("bad u32 field size".into()))?;
    Ok(u32::from_le_bytes(bytes))
}

fn parse_u16(data: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = data
        .try_into()
        .map_err(|_| KdbError::ParsingFailed("bad u16 field size".into()))?;
    Ok(u16::from_le_bytes(bytes))
}

fn parse_time(data: &[u8]) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| KdbError::ParsingFailed("bad timestamp field size".into()))?;
    let secs = u64::from_le_bytes(bytes);
    if secs == 0 {
        return Ok(None);
    }
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(Some)
        .ok_or_else(|| KdbError::ParsingFailed("timestamp out of range".into()))
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

struct GroupRecord {
    id: u32,
    name: String,
    icon: u32,
    level: u16,
    flags: u32,
    times: Times,
}

impl GroupRecord {
    fn parse(cursor: &mut Cursor) -> Result<Self> {
        let mut id = None;
        let mut name = String::new();
        let mut icon = 0;
        let mut level = 0;
        let mut flags = 0;
        let mut times = Times::now();

        loop {
            let (field, data) = cursor.next_field()?;
            match field {
                FIELD_END => break,
                GROUP_FIELD_ID => id = Some(parse_u32(data)?),
                GROUP_FIELD_NAME => name = parse_string(data)?,
                GROUP_FIELD_CREATED => {
                    times.created = parse_time(data)?.unwrap_or(times.created)
                }
                GROUP_FIELD_MODIFIED => {
                    times.modified = parse_time(data)?.unwrap_or(times.modified)
                }
                GROUP_FIELD_ACCESSED => {
                    times.accessed = parse_time(data)?.unwrap_or(times.accessed)
                }
                GROUP_FIELD_EXPIRES => times.expires = parse_time(data)?,
                GROUP_FIELD_ICON => icon = parse_u32(data)?,
                GROUP_FIELD_LEVEL => level = parse_u16(data)?,
                GROUP_FIELD_FLAGS => flags = parse_u32(data)?,
                // Unknown ids come from newer writers; skip them.
                _ => {}
            }
        }

        Ok(Self {
            id: id.ok_or_else(|| KdbError::ParsingFailed("group record missing id".into()))?,
            name,
            icon,
            level,
            flags,
            times,
        })
    }
}

struct EntryRecord {
    uuid: Uuid,
    group_id: u32,
    icon: u32,
    title: String,
    username: String,
    password: Zeroizing<String>,
    url: String,
    notes: String,
    times: Times,
}

impl EntryRecord {
    fn parse(cursor: &mut Cursor) -> Result<Self> {
        let mut uuid = None;
        let mut group_id = None;
        let mut icon = 0;
        let mut title = String::new();
        let mut username = String::new();
        let mut password = Zeroizing::new(String::new());
        let mut url = String::new();
        let mut notes = String::new();
        let mut times = Times::now();

        loop {
            let (field, data) = cursor.next_field()?;
            match field {
                FIELD_END => break,
                ENTRY_FIELD_UUID => {
                    let bytes: [u8; 16] = data.try_into().map_err(|_| {
                        KdbError::ParsingFailed("bad uuid field size".into())
                    })?;
                    uuid = Some(Uuid::from_bytes(bytes));
                }
                ENTRY_FIELD_GROUP_ID => group_id = Some(parse_u32(data)?),
                ENTRY_FIELD_ICON => icon = parse_u32(data)?,
                ENTRY_FIELD_TITLE => title = parse_string(data)?,
                ENTRY_FIELD_URL => url = parse_string(data)?,
                ENTRY_FIELD_USERNAME => username = parse_string(data)?,
                ENTRY_FIELD_PASSWORD => password = Zeroizing::new(parse_string(data)?),
                ENTRY_FIELD_NOTES => notes = parse_string(data)?,
                ENTRY_FIELD_CREATED => {
                    times.created = parse_time(data)?.unwrap_or(times.created)
                }
                ENTRY_FIELD_MODIFIED => {
                    times.modified = parse_time(data)?.unwrap_or(times.modified)
                }
                ENTRY_FIELD_ACCESSED => {
                    times.accessed = parse_time(data)?.unwrap_or(times.accessed)
                }
                ENTRY_FIELD_EXPIRES => times.expires = parse_time(data)?,
                _ => {}
            }
        }

        Ok(Self {
            uuid: uuid
                .ok_or_else(|| KdbError::ParsingFailed("entry record missing uuid".into()))?,
            group_id: group_id.ok_or_else(|| {
                KdbError::ParsingFailed("entry record missing group id".into())
            })?,
            icon,
            title,
            username,
            password,
            url,
            notes,
            times,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        let g1 = tree.create_group(tree.root()).unwrap();
        tree.group_mut(g1).unwrap().name = "internet".into();
        let g2 = tree.create_group(g1).unwrap();
        tree.group_mut(g2).unwrap().name = "email".into();

        let e = tree.create_entry(g2).unwrap();
        let entry = tree.entry_mut(e).unwrap();
        entry.title = "mail account".into();
        entry.username = "alice".into();
        entry.set_password("s3cret");
        entry.url = "https://mail.example".into();
        entry.notes = "personal".into();
        tree
    }

    #[test]
    fn roundtrip_preserves_structure_and_fields() {
        let key = KeyMaterial::from_password("hunter2");
        let bytes = encode(&sample_tree(), &key).unwrap();
        let tree = decode(&bytes, &key).unwrap();

        let root = tree.group(tree.root()).unwrap();
        assert_eq!(root.groups().len(), 1);

        let g1 = tree.group(root.groups()[0]).unwrap();
        assert_eq!(g1.name, "internet");
        assert_eq!(g1.groups().len(), 1);

        let g2 = tree.group(g1.groups()[0]).unwrap();
        assert_eq!(g2.name, "email");
        assert_eq!(g2.entries().len(), 1);

        let entry = tree.entry(g2.entries()[0]).unwrap();
        assert_eq!(entry.title, "mail account");
        assert_eq!(entry.username, "alice");
        assert_eq!(entry.password(), "s3cret");
        assert_eq!(entry.url, "https://mail.example");
        assert_eq!(entry.notes, "personal");
    }

    #[test]
    fn roundtrip_of_single_top_level_group() {
        // A lone child of the root must encode at level 0, which is what
        // the decoder requires of the first record.
        let mut tree = Tree::new();
        let g = tree.create_group(tree.root()).unwrap();
        tree.group_mut(g).unwrap().name = "alone".into();

        let key = KeyMaterial::from_password("pw");
        let bytes = encode(&tree, &key).unwrap();
        let decoded = decode(&bytes, &key).unwrap();

        let root = decoded.group(decoded.root()).unwrap();
        assert_eq!(root.groups().len(), 1);
        assert_eq!(decoded.group(root.groups()[0]).unwrap().name, "alone");
    }

    #[test]
    fn roundtrip_preserves_entry_uuid() {
        let tree = sample_tree();
        let original_uuid = tree.iter_entries().next().map(|e| tree.entry(e).unwrap().uuid());

        let key = KeyMaterial::from_password("hunter2");
        let bytes = encode(&tree, &key).unwrap();
        let decoded = decode(&bytes, &key).unwrap();
        let decoded_uuid = decoded
            .iter_entries()
            .next()
            .map(|e| decoded.entry(e).unwrap().uuid());

        assert_eq!(original_uuid, decoded_uuid);
    }

    #[test]
    fn wrong_password_fails_as_corrupted() {
        let bytes = encode(&sample_tree(), &KeyMaterial::from_password("hunter2")).unwrap();
        let result = decode(&bytes, &KeyMaterial::from_password("wrong"));
        assert!(matches!(result, Err(KdbError::FileCorrupted(_))));
    }

    #[test]
    fn tampered_ciphertext_fails_content_hash() {
        let key = KeyMaterial::from_password("hunter2");
        let mut bytes = encode(&sample_tree(), &key).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(decode(&bytes, &key), Err(KdbError::FileCorrupted(_))));
    }

    #[test]
    fn unknown_field_ids_are_skipped() {
        // A group record with an extra vendor field between known ones.
        let mut body = Zeroizing::new(Vec::new());
        write_field(&mut body, GROUP_FIELD_ID, &1u32.to_le_bytes());
        write_string_field(&mut body, GROUP_FIELD_NAME, "tolerant");
        write_field(&mut body, 0x7F01, b"vendor extension data");
        write_field(&mut body, GROUP_FIELD_LEVEL, &0u16.to_le_bytes());
        write_field(&mut body, FIELD_END, &[]);

        let tree = parse_records(&body, 1, 0).unwrap();
        let root = tree.group(tree.root()).unwrap();
        assert_eq!(tree.group(root.groups()[0]).unwrap().name, "tolerant");
    }

    #[test]
    fn oversized_declared_field_fails_parsing() {
        let mut body = Vec::new();
        body.extend_from_slice(&GROUP_FIELD_NAME.to_le_bytes());
        body.extend_from_slice(&u32::MAX.to_le_bytes());
        body.push(b'x');

        let result = parse_records(&body, 1, 0);
        assert!(matches!(result, Err(KdbError::ParsingFailed(_))));
    }

    #[test]
    fn entry_referencing_unknown_group_fails_parsing() {
        let mut body = Zeroizing::new(Vec::new());
        write_field(&mut body, ENTRY_FIELD_UUID, Uuid::new_v4().as_bytes());
        write_field(&mut body, ENTRY_FIELD_GROUP_ID, &42u32.to_le_bytes());
        write_field(&mut body, FIELD_END, &[]);

        let result = parse_records(&body, 0, 1);
        assert!(matches!(result, Err(KdbError::ParsingFailed(_))));
    }

    #[test]
    fn fresh_seeds_every_save() {
        let key = KeyMaterial::from_password("hunter2");
        let tree = sample_tree();
        let a = encode(&tree, &key).unwrap();
        let b = encode(&tree, &key).unwrap();
        // Seeds are random per save, so ciphertext differs...
        assert_ne!(a, b);
        // ...but both decode to the same content.
        assert_eq!(
            decode(&a, &key).unwrap().iter_entries().count(),
            decode(&b, &key).unwrap().iter_entries().count()
        );
    }
}
