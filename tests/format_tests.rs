//! End-to-end load/save tests across both dialects.

use std::collections::HashMap;

use kdbvault::{
    load_bytes, save, save_as, Dialect, KdbError, KeyMaterial, Tree,
};
use uuid::Uuid;

/// Flatten a tree into uuid -> (title, username, password, url, notes,
/// parent group name) for structural comparison.
fn snapshot(tree: &Tree) -> HashMap<Uuid, (String, String, String, String, String, String)> {
    tree.iter_entries()
        .map(|e| {
            let entry = tree.entry(e).unwrap();
            let parent = tree.group(entry.parent().unwrap()).unwrap();
            (
                entry.uuid(),
                (
                    entry.title.clone(),
                    entry.username.clone(),
                    entry.password().to_string(),
                    entry.url.clone(),
                    entry.notes.clone(),
                    parent.name.clone(),
                ),
            )
        })
        .collect()
}

fn populated_tree() -> Tree {
    let mut tree = Tree::new();
    let internet = tree.create_group(tree.root()).unwrap();
    tree.group_mut(internet).unwrap().name = "internet".into();
    let banking = tree.create_group(tree.root()).unwrap();
    tree.group_mut(banking).unwrap().name = "banking".into();
    let email = tree.create_group(internet).unwrap();
    tree.group_mut(email).unwrap().name = "email".into();

    for (group, title, user, pass) in [
        (email, "personal mail", "alice", "pw-one"),
        (email, "work mail", "alice@corp", "pw-two"),
        (banking, "checking", "alice", "pw-three"),
    ] {
        let e = tree.create_entry(group).unwrap();
        let entry = tree.entry_mut(e).unwrap();
        entry.title = title.into();
        entry.username = user.into();
        entry.set_password(pass);
        entry.url = format!("https://{}.example", title.replace(' ', "-"));
        entry.notes = "note".into();
    }
    tree
}

// ---------------------------------------------------------------------------
// Round-trips
// ---------------------------------------------------------------------------

#[test]
fn legacy_roundtrip_preserves_entries_and_structure() {
    let key = KeyMaterial::from_password("hunter2");
    let tree = populated_tree();
    assert_eq!(tree.min_version(), Dialect::Legacy);

    let bytes = save(&tree, &key).unwrap();
    let decoded = load_bytes(&bytes, &key).unwrap();

    assert_eq!(snapshot(&tree), snapshot(&decoded));
}

#[test]
fn structured_roundtrip_preserves_entries_and_structure() {
    let key = KeyMaterial::from_password("hunter2");
    let tree = populated_tree();

    let bytes = save_as(&tree, &key, Dialect::Structured).unwrap();
    let decoded = load_bytes(&bytes, &key).unwrap();

    assert_eq!(snapshot(&tree), snapshot(&decoded));
}

#[test]
fn ciphertext_is_not_required_to_be_identical_across_saves() {
    let key = KeyMaterial::from_password("hunter2");
    let tree = populated_tree();

    let a = save(&tree, &key).unwrap();
    let b = save(&tree, &key).unwrap();
    assert_ne!(a, b); // fresh seeds per save
    assert_eq!(
        snapshot(&load_bytes(&a, &key).unwrap()),
        snapshot(&load_bytes(&b, &key).unwrap())
    );
}

// ---------------------------------------------------------------------------
// The concrete open/save scenario
// ---------------------------------------------------------------------------

#[test]
fn bank_entry_scenario() {
    let mut tree = Tree::new();
    let g1 = tree.create_group(tree.root()).unwrap();
    let e1 = tree.create_entry(g1).unwrap();
    {
        let entry = tree.entry_mut(e1).unwrap();
        entry.title = "bank".into();
        entry.set_password("p@ss");
    }

    let key = KeyMaterial::from_password("hunter2");
    let bytes = save(&tree, &key).unwrap();

    let decoded = load_bytes(&bytes, &key).unwrap();
    let root = decoded.group(decoded.root()).unwrap();
    assert_eq!(root.groups().len(), 1);

    let child = decoded.group(root.groups()[0]).unwrap();
    assert_eq!(child.entries().len(), 1);

    let entry = decoded.entry(child.entries()[0]).unwrap();
    assert_eq!(entry.title, "bank");
    assert_eq!(entry.password(), "p@ss");

    let wrong = load_bytes(&bytes, &KeyMaterial::from_password("wrong"));
    assert!(matches!(wrong, Err(KdbError::FileCorrupted(_))));
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn wrong_password_never_returns_a_partial_tree() {
    let key = KeyMaterial::from_password("hunter2");
    for dialect in [Dialect::Legacy, Dialect::Structured] {
        let bytes = save_as(&populated_tree(), &key, dialect).unwrap();
        let result = load_bytes(&bytes, &KeyMaterial::from_password("oops"));
        assert!(matches!(result, Err(KdbError::FileCorrupted(_))));
    }
}

#[test]
fn unrecognized_signature_fails_before_decryption() {
    let result = load_bytes(b"PK\x03\x04 definitely not ours", &KeyMaterial::from_password("pw"));
    assert!(matches!(result, Err(KdbError::UnknownFileFormat)));
}

#[test]
fn truncated_stream_is_an_error_not_a_hang() {
    let key = KeyMaterial::from_password("hunter2");
    let bytes = save(&populated_tree(), &key).unwrap();
    let result = load_bytes(&bytes[..bytes.len() / 2], &key);
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Keyfiles
// ---------------------------------------------------------------------------

#[test]
fn keyfile_is_required_once_used() {
    let with_kf = KeyMaterial::from_password("hunter2").with_keyfile(vec![0xAA; 32]);
    let bytes = save(&populated_tree(), &with_kf).unwrap();

    assert!(load_bytes(&bytes, &with_kf_clone()).is_ok());
    assert!(load_bytes(&bytes, &KeyMaterial::from_password("hunter2")).is_err());

    fn with_kf_clone() -> KeyMaterial {
        KeyMaterial::from_password("hunter2").with_keyfile(vec![0xAA; 32])
    }
}

#[test]
fn malformed_structured_keyfile_still_opens_what_it_wrote() {
    // The raw-hash fallback is deliberate: a database keyed with a broken
    // JSON keyfile must keep opening with that same blob.
    let blob = b"{\"key\": {\"data\": 42}}".to_vec();
    let key = KeyMaterial::from_password("hunter2").with_keyfile(blob.clone());

    let bytes = save(&populated_tree(), &key).unwrap();
    let reopened = load_bytes(
        &bytes,
        &KeyMaterial::from_password("hunter2").with_keyfile(blob),
    );
    assert!(reopened.is_ok());
}

// ---------------------------------------------------------------------------
// Dialect floor
// ---------------------------------------------------------------------------

#[test]
fn structured_features_force_structured_output() {
    let key = KeyMaterial::from_password("pw");
    let mut tree = populated_tree();
    let e = tree.iter_entries().next().unwrap();
    tree.set_custom_field(e, "PIN", "9999").unwrap();

    // Default save follows the floor up to the structured dialect.
    let bytes = save(&tree, &key).unwrap();
    let decoded = load_bytes(&bytes, &key).unwrap();
    let e2 = decoded
        .iter_entries()
        .find(|&id| decoded.entry(id).unwrap().uuid() == tree.entry(e).unwrap().uuid())
        .unwrap();
    assert_eq!(
        decoded.entry(e2).unwrap().custom_fields(),
        &[("PIN".to_string(), "9999".to_string())]
    );

    // An explicit legacy save is refused rather than lossy — even after
    // the feature is removed, because the floor is monotonic.
    tree.remove_custom_field(e, "PIN").unwrap();
    assert!(matches!(
        save_as(&tree, &key, Dialect::Legacy),
        Err(KdbError::WriteFailed(_))
    ));

    // Until the caller explicitly resets the floor.
    tree.reset_min_version();
    assert!(save_as(&tree, &key, Dialect::Legacy).is_ok());
}
