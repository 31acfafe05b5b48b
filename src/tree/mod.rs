//! The in-memory credential tree: groups, entries, and the arena that
//! owns them.
//!
//! Nodes are owned by the [`Tree`] in an arena and addressed by copyable
//! ids.  Parent back-references are plain ids resolved through the arena,
//! so ownership flows strictly downward (tree → group → child ids) and
//! cycle checks are cheap parent-chain walks.  Removing a node detaches it
//! from its parent's child sequence but leaves its own subtree intact, so
//! a detached subtree can be re-attached elsewhere with `add_group`.

pub mod entry;
pub mod group;
pub mod times;

pub use entry::{Entry, HistorySnapshot};
pub use group::Group;
pub use times::Times;

use thiserror::Error;
use uuid::Uuid;

use crate::format::Dialect;

/// Handle to a group owned by a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(u32);

/// Handle to an entry owned by a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

/// Errors from tree mutation operations.
///
/// These are structural misuses by the caller, distinct from the codec
/// failures in [`KdbError`](crate::KdbError).  Every failing operation
/// leaves the tree unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The id does not name a node in this tree.
    #[error("id does not belong to this tree")]
    UnknownId,

    /// `add_group`/`add_entry` was given a node that still has a parent.
    #[error("node is already attached to a group")]
    AlreadyAttached,

    /// `remove_*`/`move_*` was given a node with no parent.
    #[error("node is not attached to any group")]
    NotAttached,

    /// Relinking would make a group its own ancestor.
    #[error("moving a group into itself or a descendant would create a cycle")]
    WouldCreateCycle,

    /// The target group has `can_add_entries` cleared.
    #[error("group does not permit entries")]
    EntriesNotAllowed,

    /// The root group cannot be removed or moved.
    #[error("the root group cannot be detached")]
    RootImmovable,
}

/// The credential tree.  Owns one root group and, transitively, every
/// group and entry beneath it.
///
/// Nodes are created only through the tree's factory operations, which
/// assign identity and wire parentage.  The tree also tracks its
/// *minimum dialect version*: a monotonic floor raised whenever content
/// only the structured dialect can represent is added (see
/// [`Tree::min_version`]).
pub struct Tree {
    groups: Vec<Group>,
    entries: Vec<Entry>,
    root: GroupId,
    min_version: Dialect,
}

impl Tree {
    /// A fresh tree with an empty root group.
    pub fn new() -> Self {
        let root = Group::new("Root");
        Self {
            groups: vec![root],
            entries: Vec::new(),
            root: GroupId(0),
            min_version: Dialect::Legacy,
        }
    }

    /// The root group's id.
    pub fn root(&self) -> GroupId {
        self.root
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0 as usize)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id.0 as usize)
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0 as usize)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(id.0 as usize)
    }

    // ------------------------------------------------------------------
    // Factory operations
    // ------------------------------------------------------------------

    /// Create a new empty group as the last child of `parent`.
    pub fn create_group(&mut self, parent: GroupId) -> Result<GroupId, TreeError> {
        self.check_group(parent)?;

        let id = GroupId(self.groups.len() as u32);
        let mut group = Group::new("");
        group.parent = Some(parent);
        self.groups.push(group);
        self.groups[parent.0 as usize].groups.push(id);
        Ok(id)
    }

    /// Create a new entry with a fresh UUID as the last child of `parent`.
    pub fn create_entry(&mut self, parent: GroupId) -> Result<EntryId, TreeError> {
        self.create_entry_with_uuid(parent, Uuid::new_v4())
    }

    /// Create an entry with a caller-supplied UUID.  Used by the decoders,
    /// which must reproduce identities from the file.
    pub(crate) fn create_entry_with_uuid(
        &mut self,
        parent: GroupId,
        uuid: Uuid,
    ) -> Result<EntryId, TreeError> {
        self.check_group(parent)?;
        if !self.groups[parent.0 as usize].can_add_entries {
            return Err(TreeError::EntriesNotAllowed);
        }

        let id = EntryId(self.entries.len() as u32);
        let mut entry = Entry::new(uuid);
        entry.parent = Some(parent);
        self.entries.push(entry);
        self.groups[parent.0 as usize].entries.push(id);

        if parent == self.root {
            // The legacy dialect has no record for the root group, so
            // entries parented directly to it cannot be represented there.
            self.min_version = Dialect::Structured;
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Attach / detach
    // ------------------------------------------------------------------

    /// Attach a detached group as the last child of `parent`.
    pub fn add_group(&mut self, g: GroupId, parent: GroupId) -> Result<(), TreeError> {
        self.check_group(g)?;
        self.check_group(parent)?;
        if g == self.root {
            return Err(TreeError::RootImmovable);
        }
        if self.groups[g.0 as usize].parent.is_some() {
            return Err(TreeError::AlreadyAttached);
        }
        // `parent` may live inside the detached subtree itself.
        if self.contains_group(g, parent) {
            return Err(TreeError::WouldCreateCycle);
        }

        self.groups[g.0 as usize].parent = Some(parent);
        self.groups[parent.0 as usize].groups.push(g);
        Ok(())
    }

    /// Attach a detached entry as the last child of `parent`.
    pub fn add_entry(&mut self, e: EntryId, parent: GroupId) -> Result<(), TreeError> {
        self.check_entry(e)?;
        self.check_group(parent)?;
        if self.entries[e.0 as usize].parent.is_some() {
            return Err(TreeError::AlreadyAttached);
        }
        if !self.groups[parent.0 as usize].can_add_entries {
            return Err(TreeError::EntriesNotAllowed);
        }

        self.entries[e.0 as usize].parent = Some(parent);
        self.groups[parent.0 as usize].entries.push(e);
        if parent == self.root {
            self.min_version = Dialect::Structured;
        }
        Ok(())
    }

    /// Detach a group from its parent.  Its own descendants stay attached
    /// beneath it — the subtree comes off in one piece.
    pub fn remove_group(&mut self, g: GroupId) -> Result<(), TreeError> {
        self.check_group(g)?;
        if g == self.root {
            return Err(TreeError::RootImmovable);
        }
        let parent = self.groups[g.0 as usize].parent.ok_or(TreeError::NotAttached)?;

        self.groups[parent.0 as usize].groups.retain(|&c| c != g);
        self.groups[g.0 as usize].parent = None;
        Ok(())
    }

    /// Detach an entry from its parent.
    pub fn remove_entry(&mut self, e: EntryId) -> Result<(), TreeError> {
        self.check_entry(e)?;
        let parent = self.entries[e.0 as usize].parent.ok_or(TreeError::NotAttached)?;

        self.groups[parent.0 as usize].entries.retain(|&c| c != e);
        self.entries[e.0 as usize].parent = None;
        Ok(())
    }

    /// Move a group under a new parent.
    ///
    /// Fails without touching the tree when `to` is `g` itself or any of
    /// its descendants — relinking would orphan the subtree into a cycle.
    pub fn move_group(&mut self, g: GroupId, to: GroupId) -> Result<(), TreeError> {
        self.check_group(g)?;
        self.check_group(to)?;
        if g == self.root {
            return Err(TreeError::RootImmovable);
        }
        if self.contains_group(g, to) {
            return Err(TreeError::WouldCreateCycle);
        }
        if self.groups[g.0 as usize].parent.is_none() {
            return Err(TreeError::NotAttached);
        }

        self.remove_group(g)?;
        self.add_group(g, to)
    }

    /// Move an entry to a new parent group.
    pub fn move_entry(&mut self, e: EntryId, to: GroupId) -> Result<(), TreeError> {
        self.check_entry(e)?;
        self.check_group(to)?;
        if self.entries[e.0 as usize].parent.is_none() {
            return Err(TreeError::NotAttached);
        }
        if !self.groups[to.0 as usize].can_add_entries {
            return Err(TreeError::EntriesNotAllowed);
        }

        self.remove_entry(e)?;
        self.add_entry(e, to)
    }

    /// Whether `candidate` is `ancestor` itself or lies anywhere in its
    /// descendant set.  Walks the parent chain upward, which is bounded by
    /// the tree invariant that no group is its own ancestor.
    pub fn contains_group(&self, ancestor: GroupId, candidate: GroupId) -> bool {
        let mut cursor = Some(candidate);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.groups.get(id.0 as usize).and_then(|g| g.parent);
        }
        false
    }

    // ------------------------------------------------------------------
    // Structured-only mutations
    // ------------------------------------------------------------------
    //
    // Each of these raises the minimum dialect version: the legacy record
    // stream has no place for the data they attach.

    /// Set (or replace) a named custom field on an entry.
    pub fn set_custom_field(
        &mut self,
        e: EntryId,
        key: &str,
        value: &str,
    ) -> Result<(), TreeError> {
        self.check_entry(e)?;
        let fields = &mut self.entries[e.0 as usize].custom_fields;
        match fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => fields.push((key.to_string(), value.to_string())),
        }
        self.min_version = Dialect::Structured;
        Ok(())
    }

    /// Remove a custom field.  The minimum version floor stays raised —
    /// removing the feature does not un-write it from history.
    pub fn remove_custom_field(&mut self, e: EntryId, key: &str) -> Result<(), TreeError> {
        self.check_entry(e)?;
        self.entries[e.0 as usize].custom_fields.retain(|(k, _)| k != key);
        Ok(())
    }

    /// Snapshot the entry's current standard fields into its history.
    pub fn record_history(&mut self, e: EntryId) -> Result<(), TreeError> {
        self.check_entry(e)?;
        let snapshot = self.entries[e.0 as usize].snapshot();
        self.entries[e.0 as usize].history.push(snapshot);
        self.min_version = Dialect::Structured;
        Ok(())
    }

    /// Point the entry at a custom icon.
    pub fn set_custom_icon(&mut self, e: EntryId, icon: Uuid) -> Result<(), TreeError> {
        self.check_entry(e)?;
        self.entries[e.0 as usize].custom_icon = Some(icon);
        self.min_version = Dialect::Structured;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Minimum dialect version
    // ------------------------------------------------------------------

    /// The lowest dialect able to losslessly represent this tree's
    /// content.
    ///
    /// Monotonic: once a structured-only feature has been used the floor
    /// stays at [`Dialect::Structured`] even if the feature is later
    /// removed, so a save can never silently downgrade a file.  Only
    /// [`Tree::reset_min_version`] recomputes it from current content.
    pub fn min_version(&self) -> Dialect {
        self.min_version
    }

    /// Recompute the floor from what the tree holds right now.
    pub fn reset_min_version(&mut self) {
        self.min_version = self.computed_min_version();
    }

    fn computed_min_version(&self) -> Dialect {
        if !self.groups[self.root.0 as usize].entries.is_empty() {
            return Dialect::Structured;
        }
        for g in self.iter_groups() {
            let group = &self.groups[g.0 as usize];
            if !group.unknown_fields.is_empty() {
                return Dialect::Structured;
            }
            for &e in &group.entries {
                let entry = &self.entries[e.0 as usize];
                if !entry.custom_fields.is_empty()
                    || !entry.history.is_empty()
                    || entry.custom_icon.is_some()
                    || !entry.unknown_fields.is_empty()
                {
                    return Dialect::Structured;
                }
            }
        }
        Dialect::Legacy
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// All groups reachable from the root, depth-first, root included.
    pub fn iter_groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        let mut order = Vec::with_capacity(self.groups.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.groups[id.0 as usize].groups.iter().rev() {
                stack.push(child);
            }
        }
        order.into_iter()
    }

    /// All entries reachable from the root, grouped by their parent's
    /// depth-first position.
    pub fn iter_entries(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.iter_groups()
            .flat_map(|g| self.groups[g.0 as usize].entries.clone())
    }

    fn check_group(&self, id: GroupId) -> Result<(), TreeError> {
        if (id.0 as usize) < self.groups.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownId)
        }
    }

    fn check_entry(&self, id: EntryId) -> Result<(), TreeError> {
        if (id.0 as usize) < self.entries.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownId)
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
