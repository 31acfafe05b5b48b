//! Group nodes: named containers for entries and other groups.

use serde_json::{Map, Value};

use super::times::Times;
use super::{EntryId, GroupId};

/// A named container node in the credential tree.
///
/// Child sequences hold ids, not nodes; the arena inside [`Tree`] owns the
/// nodes themselves.  The `parent` back-reference participates in lookup
/// and cycle checks only — it is never a second ownership path.
///
/// [`Tree`]: super::Tree
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub icon: u32,
    pub times: Times,
    /// Whether entries may be attached to this group.  Some groups (e.g.
    /// organizational top-level folders in older files) forbid it.
    pub can_add_entries: bool,

    pub(crate) parent: Option<GroupId>,
    pub(crate) groups: Vec<GroupId>,
    pub(crate) entries: Vec<EntryId>,

    /// Fields from a newer writer that this version does not understand,
    /// preserved opaquely so a re-save does not discard them.  Only the
    /// structured dialect populates and round-trips these.
    pub(crate) unknown_fields: Map<String, Value>,
}

impl Group {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: 0,
            times: Times::now(),
            can_add_entries: true,
            parent: None,
            groups: Vec::new(),
            entries: Vec::new(),
            unknown_fields: Map::new(),
        }
    }

    /// The parent group id, `None` for the root or a detached node.
    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    /// Ordered child group ids.
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Ordered child entry ids.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// Unknown fields carried over from a newer structured file.
    pub fn unknown_fields(&self) -> &Map<String, Value> {
        &self.unknown_fields
    }
}
