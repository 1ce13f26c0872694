//! Rendered tree and the UI-state snapshot taken before each rebuild.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{GroupRef, Item, ItemId, NodeId};
use crate::projection::StatusSummary;

/// Number of rows the tree surface can show at once. Scroll range is the
/// total row count minus this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub rows: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { rows: 20 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupNode {
    pub group: GroupRef,
    pub expanded: bool,
    /// Filtered members in view order.
    pub items: Vec<Item>,
    /// Live members before filtering.
    pub total: usize,
}

impl GroupNode {
    /// Header row plus children when expanded.
    pub fn row_count(&self) -> usize {
        if self.expanded { 1 + self.items.len() } else { 1 }
    }

    pub fn contains_item(&self, id: ItemId) -> bool {
        self.items.iter().any(|item| item.id == id)
    }
}

/// One visible line of the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub node: NodeId,
    pub group: GroupRef,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrollPosition {
    pub offset: usize,
    pub range: usize,
}

impl ScrollPosition {
    pub fn fraction(&self) -> Option<f64> {
        if self.range == 0 {
            None
        } else {
            Some(self.offset as f64 / self.range as f64)
        }
    }
}

/// What the tree surface shows. Compared structurally: two trees are equal
/// iff a reader could not tell them apart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedTree {
    pub groups: Vec<GroupNode>,
    pub selection: BTreeSet<NodeId>,
    pub focus: Option<NodeId>,
    pub scroll: ScrollPosition,
    pub viewport: Viewport,
    pub summary: StatusSummary,
    pub filters_active: bool,
}

impl RenderedTree {
    pub fn empty(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    pub fn group(&self, group: &GroupRef) -> Option<&GroupNode> {
        self.groups.iter().find(|node| &node.group == group)
    }

    pub(crate) fn group_mut(&mut self, group: &GroupRef) -> Option<&mut GroupNode> {
        self.groups.iter_mut().find(|node| &node.group == group)
    }

    /// The group whose rendered children include `id`.
    pub fn group_of_item(&self, id: ItemId) -> Option<&GroupRef> {
        self.groups
            .iter()
            .find(|node| node.contains_item(id))
            .map(|node| &node.group)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        match node {
            NodeId::Group(group) => self.group(group).is_some(),
            NodeId::Item(id) => self.group_of_item(*id).is_some(),
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.row_count());
        for node in &self.groups {
            rows.push(Row {
                node: NodeId::Group(node.group.clone()),
                group: node.group.clone(),
            });
            if node.expanded {
                rows.extend(node.items.iter().map(|item| Row {
                    node: NodeId::Item(item.id),
                    group: node.group.clone(),
                }));
            }
        }
        rows
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(GroupNode::row_count).sum()
    }

    pub fn scroll_range(&self) -> usize {
        self.row_count().saturating_sub(self.viewport.rows)
    }

    /// Row span `[first, last]` occupied by a group (header through its last
    /// visible child).
    pub fn group_span(&self, group: &GroupRef) -> Option<(usize, usize)> {
        let mut start = 0;
        for node in &self.groups {
            let count = node.row_count();
            if &node.group == group {
                return Some((start, start + count - 1));
            }
            start += count;
        }
        None
    }

    pub fn scroll_to(&mut self, offset: usize) {
        self.scroll.range = self.scroll_range();
        self.scroll.offset = offset.min(self.scroll.range);
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let next = self.scroll.offset.saturating_add_signed(delta);
        self.scroll_to(next);
    }

    /// Range must be recomputed whenever the row count changes.
    pub(crate) fn refresh_scroll_range(&mut self) {
        let offset = self.scroll.offset;
        self.scroll_to(offset);
    }
}

/// Everything about the previous frame a person would expect to survive a
/// background refresh, keyed by stable identities only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedStateSnapshot {
    /// Expansion per group: explicit toggles over the defaults each group
    /// got when first shown. Auto-expansion caused by an active filter is
    /// never written here.
    pub expansion: BTreeMap<GroupRef, bool>,
    /// `offset / range` of the previous frame; `None` when the previous
    /// range was zero.
    pub scroll_fraction: Option<f64>,
    pub selection: BTreeSet<NodeId>,
    pub focus: Option<NodeId>,
}

impl RenderedStateSnapshot {
    pub fn capture(tree: &RenderedTree, expansion: &BTreeMap<GroupRef, bool>) -> Self {
        Self {
            expansion: expansion.clone(),
            scroll_fraction: tree.scroll.fraction(),
            selection: tree.selection.clone(),
            focus: tree.focus.clone(),
        }
    }

    /// `floor(fraction * new_range)`, clamped; 0 when there is nothing to
    /// scale from.
    pub fn restore_scroll(&self, new_range: usize) -> usize {
        match self.scroll_fraction {
            Some(fraction) if fraction.is_finite() && fraction > 0.0 => {
                let offset = (fraction * new_range as f64).floor() as usize;
                offset.min(new_range)
            }
            _ => 0,
        }
    }
}
