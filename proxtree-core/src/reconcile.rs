//! Tree reconciliation
//!
//! Every rebuild goes through the same four steps: capture the UI state of
//! the current tree, build a fresh tree from the projection, restore the
//! captured state onto it by identity, then swap the new tree in. Nothing
//! half-built ever escapes this module; callers only ever see the tree
//! before or after a whole rebuild.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::gesture::GestureState;
use crate::model::{GroupName, GroupRef, NodeId};
use crate::projection::Projection;
use crate::tree::{GroupNode, RenderedStateSnapshot, RenderedTree, Viewport};

/// Per-rebuild bookkeeping. Dropped identities are expected (machines
/// disappear) and only counted here, never surfaced as errors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub generation: u64,
    pub dropped_selection: usize,
    pub dropped_focus: bool,
    pub auto_expanded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A drag-and-drop mutation is in flight; the previous tree stands.
    Skipped,
    Rebuilt(ReconcileReport),
}

impl ReconcileOutcome {
    pub fn is_rebuilt(&self) -> bool {
        matches!(self, Self::Rebuilt(_))
    }
}

/// Build a tree from `projection` and restore `snapshot` onto it.
///
/// Groups missing from `snapshot.expansion` are expanded iff they have live
/// members.
pub fn rebuild(
    snapshot: &RenderedStateSnapshot,
    projection: &Projection,
    viewport: Viewport,
) -> (RenderedTree, ReconcileReport) {
    let mut report = ReconcileReport::default();

    let mut tree = RenderedTree::empty(viewport);
    tree.summary = projection.summary;
    tree.filters_active = projection.filters_active;

    // expansion
    for group in &projection.groups {
        let intent = snapshot
            .expansion
            .get(&group.group)
            .copied()
            .unwrap_or(group.total > 0);
        if group.should_auto_expand && !intent {
            report.auto_expanded += 1;
        }
        tree.groups.push(GroupNode {
            group: group.group.clone(),
            expanded: group.should_auto_expand || intent,
            items: group.items.clone(),
            total: group.total,
        });
    }

    // selection
    let selection: BTreeSet<NodeId> = snapshot
        .selection
        .iter()
        .filter(|node| tree.contains(node))
        .cloned()
        .collect();
    report.dropped_selection = snapshot.selection.len() - selection.len();
    tree.selection = selection;

    // focus
    tree.focus = match &snapshot.focus {
        Some(node) if tree.contains(node) => Some(node.clone()),
        Some(_) => {
            report.dropped_focus = true;
            None
        }
        None => None,
    };

    // scroll, last: depends on the restored expansion
    let range = tree.scroll_range();
    tree.scroll_to(snapshot.restore_scroll(range));

    (tree, report)
}

/// Owns the rendered tree and the saved expansion intent. Only explicit
/// toggles are saved; auto-expansion from an active filter never is.
///
/// A group never toggled keeps the default it got the first time it was
/// rendered against a non-empty live list, so it does not flip open or shut
/// as members come and go.
#[derive(Debug)]
pub struct TreeReconciler {
    tree: RenderedTree,
    expansion: BTreeMap<GroupRef, bool>,
    seen: BTreeMap<GroupRef, bool>,
    viewport: Viewport,
    generation: u64,
}

impl TreeReconciler {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            tree: RenderedTree::empty(viewport),
            expansion: BTreeMap::new(),
            seen: BTreeMap::new(),
            viewport,
            generation: 0,
        }
    }

    /// Seed saved expansion for named groups, e.g. from the group file.
    pub fn with_saved_expansion(mut self, saved: &BTreeMap<GroupName, bool>) -> Self {
        for (name, expanded) in saved {
            self.expansion
                .insert(GroupRef::Named(name.clone()), *expanded);
        }
        self
    }

    pub fn tree(&self) -> &RenderedTree {
        &self.tree
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn snapshot(&self) -> RenderedStateSnapshot {
        let mut expansion = self.seen.clone();
        expansion.extend(self.expansion.iter().map(|(group, expanded)| (group.clone(), *expanded)));
        RenderedStateSnapshot::capture(&self.tree, &expansion)
    }

    /// Saved expansion of named groups, in the shape the group file stores.
    /// The ungrouped bucket is left out.
    pub fn saved_expansion(&self) -> BTreeMap<GroupName, bool> {
        self.expansion
            .iter()
            .filter_map(|(group, expanded)| group.name().map(|name| (name.to_string(), *expanded)))
            .collect()
    }

    pub fn reconcile(&mut self, projection: &Projection, gesture: &GestureState) -> ReconcileOutcome {
        if gesture.is_mutating() {
            trace!("reconcile skipped, drag in progress");
            return ReconcileOutcome::Skipped;
        }

        let snapshot = self.snapshot();
        let (tree, mut report) = rebuild(&snapshot, projection, self.viewport);
        self.generation += 1;
        report.generation = self.generation;
        self.tree = tree;
        // an empty live list means nothing has been observed yet
        if projection.summary.total() > 0 {
            for group in &projection.groups {
                self.seen
                    .entry(group.group.clone())
                    .or_insert(group.total > 0);
            }
        }

        if report.dropped_selection > 0 || report.dropped_focus {
            trace!(
                dropped_selection = report.dropped_selection,
                dropped_focus = report.dropped_focus,
                "stale identities dropped"
            );
        }
        debug!(
            generation = report.generation,
            groups = self.tree.groups.len(),
            rows = self.tree.row_count(),
            "tree rebuilt"
        );
        ReconcileOutcome::Rebuilt(report)
    }

    // --- direct UI-state edits, no rebuild involved ---

    /// Flip a group's expansion. Returns the new state, or `None` if the
    /// group is not in the tree.
    pub fn toggle_expansion(&mut self, group: &GroupRef) -> Option<bool> {
        let expanded = !self.tree.group(group)?.expanded;
        self.set_expanded(group, expanded)
    }

    pub fn set_expanded(&mut self, group: &GroupRef, expanded: bool) -> Option<bool> {
        let node = self.tree.group_mut(group)?;
        node.expanded = expanded;
        self.expansion.insert(group.clone(), expanded);
        self.tree.refresh_scroll_range();
        debug!(group = %group, expanded, "group expansion set");
        Some(expanded)
    }

    pub fn expand_all(&mut self) {
        self.set_all(true);
    }

    pub fn collapse_all(&mut self) {
        self.set_all(false);
    }

    fn set_all(&mut self, expanded: bool) {
        for node in &mut self.tree.groups {
            node.expanded = expanded;
            self.expansion.insert(node.group.clone(), expanded);
        }
        self.tree.refresh_scroll_range();
    }

    /// Select a node. Non-additive selection replaces the current one.
    /// Unknown nodes are ignored.
    pub fn select(&mut self, node: NodeId, additive: bool) -> bool {
        if !self.tree.contains(&node) {
            return false;
        }
        if !additive {
            self.tree.selection.clear();
        }
        self.tree.selection.insert(node);
        true
    }

    pub fn set_selection(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        let tree = &self.tree;
        let selection = nodes.into_iter().filter(|node| tree.contains(node)).collect();
        self.tree.selection = selection;
    }

    pub fn clear_selection(&mut self) {
        self.tree.selection.clear();
    }

    pub fn focus(&mut self, node: Option<NodeId>) -> bool {
        match node {
            Some(node) if !self.tree.contains(&node) => false,
            node => {
                self.tree.focus = node;
                true
            }
        }
    }

    pub fn scroll_to(&mut self, offset: usize) {
        self.tree.scroll_to(offset);
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.tree.scroll_by(delta);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.tree.viewport = viewport;
        self.tree.refresh_scroll_range();
    }

    // --- keep saved state keyed to the store's names ---

    pub fn rename_group(&mut self, old: &str, new: &str) {
        let old_ref = GroupRef::named(old);
        let new_ref = GroupRef::named(new);
        if let Some(expanded) = self.expansion.remove(&old_ref) {
            self.expansion.insert(new_ref.clone(), expanded);
        }
        if let Some(expanded) = self.seen.remove(&old_ref) {
            self.seen.insert(new_ref.clone(), expanded);
        }
        let remap = |node: &NodeId| match node {
            NodeId::Group(group) if group == &old_ref => NodeId::Group(new_ref.clone()),
            other => other.clone(),
        };
        self.tree.selection = self.tree.selection.iter().map(remap).collect();
        self.tree.focus = self.tree.focus.as_ref().map(remap);
        if let Some(node) = self.tree.group_mut(&old_ref) {
            node.group = new_ref;
        }
    }

    pub fn forget_group(&mut self, name: &str) {
        let group = GroupRef::named(name);
        self.expansion.remove(&group);
        self.seen.remove(&group);
    }
}
