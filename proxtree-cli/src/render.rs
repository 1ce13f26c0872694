use proxtree_core::filter::FilterState;
use proxtree_core::model::{Item, NodeId};
use proxtree_core::tree::{GroupNode, RenderedTree};

fn status_glyph(item: &Item) -> &'static str {
    if item.status.is_running() { "●" } else { "○" }
}

fn group_header(node: &GroupNode, filters_active: bool) -> String {
    let arrow = if node.expanded { "▾" } else { "▸" };
    let count = if filters_active {
        format!("{} of {}", node.items.len(), node.total)
    } else {
        node.total.to_string()
    };
    format!("{} {} ({})", arrow, node.group.label(), count)
}

fn marker(tree: &RenderedTree, node: &NodeId) -> &'static str {
    match (tree.focus.as_ref() == Some(node), tree.selection.contains(node)) {
        (true, true) => ">*",
        (true, false) => "> ",
        (false, true) => " *",
        (false, false) => "  ",
    }
}

/// Every row of the tree, regardless of the viewport.
pub fn tree_lines(tree: &RenderedTree) -> Vec<String> {
    let mut lines = Vec::with_capacity(tree.row_count());
    for node in &tree.groups {
        let id = NodeId::Group(node.group.clone());
        lines.push(format!("{}{}", marker(tree, &id), group_header(node, tree.filters_active)));
        if !node.expanded {
            continue;
        }
        for item in &node.items {
            let id = NodeId::Item(item.id);
            lines.push(format!(
                "{}    {} {:<24} {:>6}  {}",
                marker(tree, &id),
                status_glyph(item),
                item.name,
                item.id,
                item.status
            ));
        }
    }
    lines
}

pub fn status_line(tree: &RenderedTree, filter: &FilterState) -> String {
    format!(
        "running: {}  not running: {}  filter: {}  scroll: {}/{}",
        tree.summary.running,
        tree.summary.not_running,
        filter.label(),
        tree.scroll.offset,
        tree.scroll.range
    )
}

/// The rows a viewport of `tree.viewport.rows` would show at the current
/// scroll offset.
pub fn visible_lines(tree: &RenderedTree) -> Vec<String> {
    tree_lines(tree)
        .into_iter()
        .skip(tree.scroll.offset)
        .take(tree.viewport.rows)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use proxtree_core::gesture::GestureState;
    use proxtree_core::model::{GroupRef, ItemStatus};
    use proxtree_core::projection::build_projection;
    use proxtree_core::reconcile::TreeReconciler;
    use proxtree_core::store::GroupStore;
    use proxtree_core::tree::Viewport;

    #[test]
    fn test_render_filtered_tree() {
        let mut store = GroupStore::new();
        store.create_group("Prod").unwrap();
        store.assign(1, &GroupRef::named("Prod"), None).unwrap();
        store.assign(2, &GroupRef::named("Prod"), None).unwrap();
        let live = vec![
            Item::new(1, "api", ItemStatus::Running),
            Item::new(2, "db", ItemStatus::Stopped),
            Item::new(3, "misc", ItemStatus::Stopped),
        ];
        let filter = FilterState::new().with_search("api");

        let mut reconciler = TreeReconciler::new(Viewport { rows: 10 });
        reconciler.reconcile(&build_projection(&live, &store, &filter), &GestureState::idle());
        reconciler.select(NodeId::Item(1), false);

        let lines = tree_lines(reconciler.tree());
        assert_eq!(lines[0], "  ▾ Prod (1 of 2)");
        assert!(lines[1].starts_with(" *    ● api"));
        assert_eq!(lines[2], "  ▾ Ungrouped (0 of 1)");
        assert_eq!(lines.len(), 3);
        assert_eq!(
            status_line(reconciler.tree(), &filter),
            "running: 1  not running: 2  filter: ALL /api/  scroll: 0/0"
        );
    }
}
