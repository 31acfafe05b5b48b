//! Entry nodes: leaf credential records.

use serde_json::{Map, Value};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::times::Times;
use super::GroupId;

/// A single credential record.
///
/// The UUID is assigned at creation and stable for the entry's lifetime;
/// it is the identity that round-trips through serialization.  The
/// password lives in a [`Zeroizing`] buffer so its memory is wiped when
/// the entry is dropped or the password replaced.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) uuid: Uuid,
    pub icon: u32,
    pub times: Times,

    pub title: String,
    pub username: String,
    pub(crate) password: Zeroizing<String>,
    pub url: String,
    pub notes: String,

    pub(crate) parent: Option<GroupId>,

    // Structured-dialect-only data.  Mutated through `Tree` methods so the
    // minimum-version floor is raised alongside.
    pub(crate) custom_fields: Vec<(String, String)>,
    pub(crate) history: Vec<HistorySnapshot>,
    pub(crate) custom_icon: Option<Uuid>,

    /// Unknown fields from a newer writer, preserved for round-trip.
    pub(crate) unknown_fields: Map<String, Value>,
}

impl Entry {
    pub(crate) fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            icon: 0,
            times: Times::now(),
            title: String::new(),
            username: String::new(),
            password: Zeroizing::new(String::new()),
            url: String::new(),
            notes: String::new(),
            parent: None,
            custom_fields: Vec::new(),
            history: Vec::new(),
            custom_icon: None,
            unknown_fields: Map::new(),
        }
    }

    /// The entry's stable unique identifier.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The parent group id, `None` while detached.
    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replace the password and update the modification time.  The old
    /// buffer is zeroed on drop.
    pub fn set_password(&mut self, password: &str) {
        self.password = Zeroizing::new(password.to_string());
        self.times.touch_modified();
    }

    /// Structured-only named fields beyond the five standard ones, in
    /// insertion order.
    pub fn custom_fields(&self) -> &[(String, String)] {
        &self.custom_fields
    }

    /// Retained prior revisions, oldest first.
    pub fn history(&self) -> &[HistorySnapshot] {
        &self.history
    }

    /// Reference to a custom icon stored elsewhere in the file.
    pub fn custom_icon(&self) -> Option<Uuid> {
        self.custom_icon
    }

    /// Unknown fields carried over from a newer structured file.
    pub fn unknown_fields(&self) -> &Map<String, Value> {
        &self.unknown_fields
    }

    /// Capture the current standard fields as a history snapshot.
    pub(crate) fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            title: self.title.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            url: self.url.clone(),
            notes: self.notes.clone(),
            modified: self.times.modified,
        }
    }
}

/// A frozen copy of an entry's standard fields at some past revision.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub title: String,
    pub username: String,
    pub(crate) password: Zeroizing<String>,
    pub url: String,
    pub notes: String,
    pub modified: chrono::DateTime<chrono::Utc>,
}

impl HistorySnapshot {
    pub fn password(&self) -> &str {
        &self.password
    }
}
