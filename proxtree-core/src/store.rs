//! Group & order store
//!
//! The single source of truth for "which group does item X live in" and
//! "in which order are groups shown". Membership is independent of the live
//! item list: a group keeps ids of machines that are currently unreachable,
//! and a group with no members is a perfectly valid, persistent state.
//!
//! The store never writes to disk itself. Every successful mutation bumps a
//! revision and marks the store dirty; an external writer
//! ([`crate::persist::GroupFileWriter`]) picks that up.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{GroupName, GroupRef, ItemId};

/// Every way the store can be mutated, as a value. Callers that need the
/// "no two mutations interleave" guarantee push these through one queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCommand {
    /// Register an empty group at the end of the order
    CreateGroup { name: String },
    /// Rename a group, keeping its members and position
    RenameGroup { old: String, new: String },
    /// Delete a group; its members become ungrouped
    DeleteGroup { name: String },
    /// Move an item into a group (or the ungrouped bucket), optionally at a
    /// member index
    Assign {
        id: ItemId,
        target: GroupRef,
        index: Option<usize>,
    },
    /// Replace the display order; omitted groups keep their relative order
    /// at the end
    SetGroupOrder { names: Vec<String> },
    /// Move a group into the slot held by another
    MoveGroup { source: String, target: String },
}

/// What a successful command changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreChange {
    GroupCreated { name: GroupName },
    GroupRenamed { old: GroupName, new: GroupName },
    /// `released` lists the former members, now ungrouped
    GroupDeleted { name: GroupName, released: Vec<ItemId> },
    Assigned { id: ItemId, group: GroupRef },
    OrderChanged,
    /// The command was valid but left the store as it was
    Unchanged,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupStore {
    groups: BTreeMap<GroupName, Vec<ItemId>>,
    order: Vec<GroupName>,
    dirty: bool,
    revision: u64,
}

fn normalize_name(raw: &str) -> Result<GroupName, StoreError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidGroupName {
            name: raw.to_string(),
        });
    }
    Ok(name.to_string())
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted parts, repairing anything that violates
    /// the store invariants:
    /// - order entries naming unknown groups are dropped, duplicates removed
    /// - groups missing from the order are appended alphabetically
    ///   (case-insensitive)
    /// - an id claimed by several groups stays in the first one in display
    ///   order
    ///
    /// A repaired store comes back dirty so the fixed state gets written out.
    pub fn from_parts(
        groups: impl IntoIterator<Item = (String, Vec<ItemId>)>,
        order: Vec<String>,
    ) -> Self {
        let mut raw: BTreeMap<GroupName, Vec<ItemId>> = BTreeMap::new();
        let mut repaired = false;
        for (name, members) in groups {
            let Ok(name) = normalize_name(&name) else {
                warn!(name = %name, "dropping group with blank name");
                repaired = true;
                continue;
            };
            raw.entry(name).or_default().extend(members);
        }

        let mut seen_names = BTreeSet::new();
        let mut display: Vec<GroupName> = Vec::with_capacity(raw.len());
        for name in order {
            let name = name.trim().to_string();
            if raw.contains_key(&name) && seen_names.insert(name.clone()) {
                display.push(name);
            } else {
                repaired = true;
            }
        }
        let mut missing: Vec<GroupName> = raw
            .keys()
            .filter(|name| !seen_names.contains(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            repaired = true;
        }
        missing.sort_by_key(|name| name.to_lowercase());
        display.extend(missing);

        let mut claimed = BTreeSet::new();
        let mut groups = BTreeMap::new();
        for name in &display {
            let members = raw.remove(name).unwrap_or_default();
            let mut kept = Vec::with_capacity(members.len());
            for id in members {
                if claimed.insert(id) {
                    kept.push(id);
                } else {
                    warn!(id, group = %name, "id already claimed by another group, dropping duplicate claim");
                    repaired = true;
                }
            }
            groups.insert(name.clone(), kept);
        }

        Self {
            groups,
            order: display,
            dirty: repaired,
            revision: 0,
        }
    }

    // --- queries ---

    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn members(&self, name: &str) -> Option<&[ItemId]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Group names in display order. Always lists every known group exactly
    /// once; the ungrouped bucket is never part of it.
    pub fn display_order(&self) -> &[GroupName] {
        &self.order
    }

    pub fn group_names(&self) -> impl Iterator<Item = &GroupName> {
        self.order.iter()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_of(&self, id: ItemId) -> GroupRef {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(&id))
            .map(|(name, _)| GroupRef::Named(name.clone()))
            .unwrap_or(GroupRef::Ungrouped)
    }

    /// Every id claimed by some named group.
    pub fn claimed_ids(&self) -> BTreeSet<ItemId> {
        self.groups.values().flatten().copied().collect()
    }

    /// Ids from `live` that no group claims, in `live` order. This is the
    /// derived membership of the ungrouped bucket.
    pub fn ungrouped<'a>(&self, live: impl IntoIterator<Item = &'a ItemId>) -> Vec<ItemId> {
        let claimed = self.claimed_ids();
        live.into_iter()
            .copied()
            .filter(|id| !claimed.contains(id))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Clear the dirty flag, but only if nothing changed since `revision`
    /// was observed.
    pub fn mark_clean(&mut self, revision: u64) {
        if self.revision == revision {
            self.dirty = false;
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    // --- mutations ---

    pub fn apply(&mut self, command: StoreCommand) -> Result<StoreChange, StoreError> {
        match command {
            StoreCommand::CreateGroup { name } => self
                .create_group(&name)
                .map(|name| StoreChange::GroupCreated { name }),
            StoreCommand::RenameGroup { old, new } => {
                let new = self.rename_group(&old, &new)?;
                if new == old {
                    Ok(StoreChange::Unchanged)
                } else {
                    Ok(StoreChange::GroupRenamed { old, new })
                }
            }
            StoreCommand::DeleteGroup { name } => {
                let released = self.delete_group(&name)?;
                Ok(StoreChange::GroupDeleted { name, released })
            }
            StoreCommand::Assign { id, target, index } => {
                self.assign(id, &target, index)?;
                Ok(StoreChange::Assigned { id, group: target })
            }
            StoreCommand::SetGroupOrder { names } => {
                self.set_group_order(names);
                Ok(StoreChange::OrderChanged)
            }
            StoreCommand::MoveGroup { source, target } => {
                if self.move_group(&source, &target)? {
                    Ok(StoreChange::OrderChanged)
                } else {
                    Ok(StoreChange::Unchanged)
                }
            }
        }
    }

    /// Register an empty group at the end of the display order.
    pub fn create_group(&mut self, name: &str) -> Result<GroupName, StoreError> {
        let name = normalize_name(name)?;
        if self.groups.contains_key(&name) {
            return Err(StoreError::DuplicateGroup { name });
        }
        self.groups.insert(name.clone(), Vec::new());
        self.order.push(name.clone());
        self.touch();
        debug!(group = %name, "group created");
        Ok(name)
    }

    /// Rename keeping members and display position. Renaming to the same
    /// name is a no-op.
    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<GroupName, StoreError> {
        if !self.groups.contains_key(old) {
            return Err(StoreError::UnknownGroup {
                name: old.to_string(),
            });
        }
        let new = normalize_name(new)?;
        if new == old {
            return Ok(new);
        }
        if self.groups.contains_key(&new) {
            return Err(StoreError::DuplicateGroup { name: new });
        }

        let members = self.groups.remove(old).unwrap_or_default();
        self.groups.insert(new.clone(), members);
        for slot in self.order.iter_mut().filter(|slot| slot.as_str() == old) {
            *slot = new.clone();
        }
        self.touch();
        debug!(from = %old, to = %new, "group renamed");
        Ok(new)
    }

    /// Delete a group; its members fall back to the ungrouped bucket.
    /// Returns the released ids in their former member order.
    pub fn delete_group(&mut self, name: &str) -> Result<Vec<ItemId>, StoreError> {
        let released = self
            .groups
            .remove(name)
            .ok_or_else(|| StoreError::UnknownGroup {
                name: name.to_string(),
            })?;
        self.order.retain(|slot| slot != name);
        self.touch();
        debug!(group = %name, released = released.len(), "group deleted");
        Ok(released)
    }

    /// Move `id` into `target`, removing it from wherever it was first.
    ///
    /// `index` places it inside the target's member sequence (clamped to the
    /// end); `None` appends. Never creates a named group: assigning to an
    /// unknown name fails with `UnknownGroup`.
    pub fn assign(
        &mut self,
        id: ItemId,
        target: &GroupRef,
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        if let GroupRef::Named(name) = target
            && !self.groups.contains_key(name)
        {
            return Err(StoreError::UnknownGroup { name: name.clone() });
        }

        for members in self.groups.values_mut() {
            members.retain(|member| *member != id);
        }

        if let GroupRef::Named(name) = target
            && let Some(members) = self.groups.get_mut(name)
        {
            let at = index.unwrap_or(members.len()).min(members.len());
            members.insert(at, id);
        }
        self.touch();
        debug!(id, target = %target, "item assigned");
        Ok(())
    }

    /// "Remove from group": same as assigning to the ungrouped bucket.
    pub fn unassign(&mut self, id: ItemId) {
        // assigning to Ungrouped cannot fail
        let _ = self.assign(id, &GroupRef::Ungrouped, None);
    }

    /// Replace the display order. Unknown names are ignored, duplicates
    /// collapse to their first position, and known groups left out keep
    /// their previous relative order at the end.
    pub fn set_group_order(&mut self, names: Vec<String>) {
        let mut next: Vec<GroupName> = Vec::with_capacity(self.order.len());
        for name in names {
            if self.groups.contains_key(&name) && !next.contains(&name) {
                next.push(name);
            }
        }
        for name in &self.order {
            if !next.contains(name) {
                next.push(name.clone());
            }
        }
        self.order = next;
        self.touch();
        debug!(order = ?self.order, "group order replaced");
    }

    /// Move `source` into the display slot currently held by `target`.
    /// Returns false when source and target are the same group.
    pub fn move_group(&mut self, source: &str, target: &str) -> Result<bool, StoreError> {
        for name in [source, target] {
            if !self.groups.contains_key(name) {
                return Err(StoreError::UnknownGroup {
                    name: name.to_string(),
                });
            }
        }
        if source == target {
            return Ok(false);
        }

        let mut order = self.order.clone();
        let target_at = order.iter().position(|n| n == target).unwrap_or(order.len());
        order.retain(|n| n != source);
        let at = target_at.min(order.len());
        order.insert(at, source.to_string());
        self.set_group_order(order);
        Ok(true)
    }
}
