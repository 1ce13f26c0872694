//! Projection builder
//!
//! Turns the live item list, the group store and the current filter into the
//! ordered view model the reconciler renders. Recomputed from scratch on
//! every tick; nothing here is stateful.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::filter::{FilterState, has_active_filters, matches};
use crate::model::{GroupRef, Item, ItemId};
use crate::store::GroupStore;

#[derive(Clone, Debug, PartialEq)]
pub struct GroupProjection {
    pub group: GroupRef,
    /// Members that passed the filter, in view order.
    pub items: Vec<Item>,
    /// Live members before filtering ("N" in "0 of N").
    pub total: usize,
    pub should_auto_expand: bool,
}

impl GroupProjection {
    pub fn visible(&self) -> usize {
        self.items.len()
    }
}

/// Running / not-running counts over the whole live list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub running: usize,
    pub not_running: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.running + self.not_running
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Projection {
    pub groups: Vec<GroupProjection>,
    pub filters_active: bool,
    pub summary: StatusSummary,
}

impl Projection {
    pub fn group(&self, group: &GroupRef) -> Option<&GroupProjection> {
        self.groups.iter().find(|g| &g.group == group)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.groups.iter().flat_map(|g| g.items.iter().map(|item| item.id))
    }
}

/// View order inside a group: running first, then case-folded name. The id
/// breaks remaining ties so the order is stable across ticks.
pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| {
        a.status
            .priority()
            .cmp(&b.status.priority())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn build_projection(live: &[Item], store: &GroupStore, filter: &FilterState) -> Projection {
    let filters_active = has_active_filters(filter);

    // First occurrence wins if the source reports an id twice.
    let mut by_id: BTreeMap<ItemId, &Item> = BTreeMap::new();
    let mut live_order: Vec<ItemId> = Vec::with_capacity(live.len());
    for item in live {
        if let Entry::Vacant(slot) = by_id.entry(item.id) {
            slot.insert(item);
            live_order.push(item.id);
        }
    }

    let mut summary = StatusSummary::default();
    for id in &live_order {
        if by_id[id].status.is_running() {
            summary.running += 1;
        } else {
            summary.not_running += 1;
        }
    }

    let mut groups = Vec::with_capacity(store.group_count() + 1);
    let mut claimed: BTreeSet<ItemId> = BTreeSet::new();
    for name in store.display_order() {
        let members = store.members(name).unwrap_or_default();
        claimed.extend(members.iter().copied());
        // Ids absent from the live list are skipped here only; the store
        // keeps them so a machine that drops off for a tick comes back in
        // its group.
        let present: Vec<&Item> = members.iter().filter_map(|id| by_id.get(id).copied()).collect();
        groups.push(project_group(GroupRef::Named(name.clone()), &present, filter, filters_active));
    }

    let ungrouped: Vec<&Item> = live_order
        .iter()
        .filter(|id| !claimed.contains(*id))
        .map(|id| by_id[id])
        .collect();
    groups.push(project_group(GroupRef::Ungrouped, &ungrouped, filter, filters_active));

    Projection {
        groups,
        filters_active,
        summary,
    }
}

fn project_group(
    group: GroupRef,
    members: &[&Item],
    filter: &FilterState,
    filters_active: bool,
) -> GroupProjection {
    let mut items: Vec<Item> = members
        .iter()
        .filter(|item| matches(item, filter))
        .map(|item| (*item).clone())
        .collect();
    sort_items(&mut items);

    GroupProjection {
        group,
        should_auto_expand: filters_active && !items.is_empty(),
        total: members.len(),
        items,
    }
}
