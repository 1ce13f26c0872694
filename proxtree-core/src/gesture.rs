//! Drag & drop
//!
//! A gesture moves through `Idle -> Dragging -> Idle`. While dragging, the
//! shared [`GestureState`] reports `mutating`, which the reconciler and the
//! refresh coordinator consult to stay out of the way. Every way out of a
//! drag (drop, cancel, superseded) goes through `end_gesture`, so the flag
//! can never leak.

use tracing::debug;

use crate::error::StoreError;
use crate::model::{GroupName, GroupRef, ItemId, NodeId};
use crate::store::GroupStore;
use crate::tree::RenderedTree;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DragSource {
    Item(ItemId),
    Group(GroupName),
}

impl DragSource {
    /// The ungrouped header is not draggable.
    pub fn from_node(node: &NodeId) -> Option<Self> {
        match node {
            NodeId::Item(id) => Some(Self::Item(*id)),
            NodeId::Group(GroupRef::Named(name)) => Some(Self::Group(name.clone())),
            NodeId::Group(GroupRef::Ungrouped) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GestureState {
    source: Option<DragSource>,
}

impl GestureState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn dragging(source: DragSource) -> Self {
        Self {
            source: Some(source),
        }
    }

    pub fn is_mutating(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&DragSource> {
        self.source.as_ref()
    }
}

/// Where the pointer was released.
#[derive(Clone, Debug, PartialEq)]
pub enum DropTarget {
    /// The surface already resolved the row under the pointer.
    Node(NodeId),
    /// Content-space y coordinate; hit-tested against the tree.
    Position { y: f32 },
}

/// How a drop target was turned into a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropResolution {
    Direct(GroupRef),
    /// Landed in the gap around a group, within tolerance.
    Nearby(GroupRef),
    /// Nothing matched; the item goes to the ungrouped bucket.
    FallbackUngrouped,
}

impl DropResolution {
    pub fn group(&self) -> GroupRef {
        match self {
            Self::Direct(group) | Self::Nearby(group) => group.clone(),
            Self::FallbackUngrouped => GroupRef::Ungrouped,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The pointer left the tree without dropping
    LeftSurface,
    /// The input sequence was aborted (escape, focus loss)
    Aborted,
    /// A new drag started before this one ended
    Superseded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    Moved {
        id: ItemId,
        from: GroupRef,
        resolution: DropResolution,
    },
    Reordered {
        group: GroupName,
        onto: GroupName,
    },
    NoChange,
    Cancelled(CancelReason),
}

/// Broadcast to gesture listeners
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GestureSignal {
    /// A drag began; rebuilds are suppressed from here on
    Started(DragSource),
    /// The drag is over (dropped, cancelled or superseded)
    Ended,
}

/// Row metrics for hit-testing `DropTarget::Position`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowGeometry {
    pub row_height: f32,
    pub tolerance: f32,
}

impl Default for RowGeometry {
    fn default() -> Self {
        Self {
            row_height: 24.0,
            tolerance: 5.0,
        }
    }
}

impl RowGeometry {
    /// Convert a viewport y into content space.
    pub fn content_y(&self, view_y: f32, scroll_offset: usize) -> f32 {
        view_y + scroll_offset as f32 * self.row_height
    }

    fn row_at(&self, y: f32) -> Option<usize> {
        if y < 0.0 || self.row_height <= 0.0 {
            return None;
        }
        Some((y / self.row_height).floor() as usize)
    }

    /// Exact row hit first, then the tolerance band around each group's
    /// span.
    pub fn resolve(&self, tree: &RenderedTree, y: f32) -> Resolved {
        let rows = tree.rows();
        if let Some(row) = self.row_at(y).and_then(|index| rows.get(index)) {
            return Resolved::Row(row.node.clone(), row.group.clone());
        }
        for node in &tree.groups {
            let Some((first, last)) = tree.group_span(&node.group) else {
                continue;
            };
            let top = first as f32 * self.row_height - self.tolerance;
            let bottom = (last + 1) as f32 * self.row_height + self.tolerance;
            if y >= top && y < bottom {
                return Resolved::Near(node.group.clone());
            }
        }
        Resolved::Nothing
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    Row(NodeId, GroupRef),
    Near(GroupRef),
    Nothing,
}

type Listener = Box<dyn FnMut(&GestureSignal) + Send>;

#[derive(Default)]
pub struct DragDropHandler {
    state: GestureState,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for DragDropHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragDropHandler")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl DragDropHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&GestureSignal) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    /// Start a drag. A drag already in progress is cancelled first.
    pub fn begin(&mut self, source: DragSource) -> Option<DropOutcome> {
        let superseded = self.cancel(CancelReason::Superseded);
        debug!(source = ?source, "drag started");
        self.state = GestureState::dragging(source.clone());
        self.emit(GestureSignal::Started(source));
        superseded
    }

    pub fn cancel(&mut self, reason: CancelReason) -> Option<DropOutcome> {
        self.state.source.as_ref()?;
        debug!(reason = ?reason, "drag cancelled");
        self.end_gesture();
        Some(DropOutcome::Cancelled(reason))
    }

    /// Finish the drag at `target`, committing the store mutation before
    /// the gesture ends.
    pub fn drop_on(
        &mut self,
        target: DropTarget,
        store: &mut GroupStore,
        tree: &RenderedTree,
        geometry: &RowGeometry,
    ) -> Result<DropOutcome, StoreError> {
        let Some(source) = self.state.source.clone() else {
            return Ok(DropOutcome::NoChange);
        };
        let resolved = match target {
            DropTarget::Node(node) => match &node {
                NodeId::Group(group) => Resolved::Row(node.clone(), group.clone()),
                NodeId::Item(id) => match tree.group_of_item(*id) {
                    Some(group) => Resolved::Row(node.clone(), group.clone()),
                    None => Resolved::Nothing,
                },
            },
            DropTarget::Position { y } => geometry.resolve(tree, y),
        };

        let result = match source {
            DragSource::Item(id) => drop_item(id, resolved, store),
            DragSource::Group(name) => drop_group(&name, resolved, store),
        };
        self.end_gesture();
        result
    }

    fn end_gesture(&mut self) {
        self.state = GestureState::idle();
        self.emit(GestureSignal::Ended);
    }

    fn emit(&mut self, signal: GestureSignal) {
        for listener in &mut self.listeners {
            listener(&signal);
        }
    }
}

fn drop_item(id: ItemId, resolved: Resolved, store: &mut GroupStore) -> Result<DropOutcome, StoreError> {
    // The tree stays frozen during a drag; the group under the pointer may
    // have been deleted or renamed since.
    let resolved = match resolved {
        Resolved::Row(_, GroupRef::Named(name)) | Resolved::Near(GroupRef::Named(name))
            if !store.contains_group(&name) =>
        {
            debug!(id, group = %name, "drop target no longer exists");
            Resolved::Nothing
        }
        other => other,
    };
    let (resolution, onto_item) = match resolved {
        Resolved::Row(NodeId::Item(other), group) => (DropResolution::Direct(group), Some(other)),
        Resolved::Row(NodeId::Group(_), group) => (DropResolution::Direct(group), None),
        Resolved::Near(group) => (DropResolution::Nearby(group), None),
        Resolved::Nothing => {
            debug!(id, "drop target unresolved, falling back to ungrouped");
            (DropResolution::FallbackUngrouped, None)
        }
    };

    let from = store.group_of(id);
    let to = resolution.group();
    // Dropping onto a member row places the item at that member's slot.
    let index = match (&to, onto_item) {
        (GroupRef::Named(name), Some(other)) if other != id => store
            .members(name)
            .and_then(|members| members.iter().position(|member| *member == other)),
        _ => None,
    };
    if from == to && index.is_none() {
        return Ok(DropOutcome::NoChange);
    }

    store.assign(id, &to, index)?;
    debug!(id, from = %from, to = %to, "item dropped");
    Ok(DropOutcome::Moved { id, from, resolution })
}

fn drop_group(name: &str, resolved: Resolved, store: &mut GroupStore) -> Result<DropOutcome, StoreError> {
    // Groups only reorder onto another named group's header.
    let Resolved::Row(NodeId::Group(GroupRef::Named(onto)), _) = resolved else {
        return Ok(DropOutcome::NoChange);
    };
    if !store.contains_group(name) || !store.contains_group(&onto) {
        debug!(group = %name, onto = %onto, "group drop onto a stale header ignored");
        return Ok(DropOutcome::NoChange);
    }
    if !store.move_group(name, &onto)? {
        return Ok(DropOutcome::NoChange);
    }
    debug!(group = %name, onto = %onto, "group reordered");
    Ok(DropOutcome::Reordered {
        group: name.to_string(),
        onto,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filter::FilterState;
    use crate::model::{Item, ItemStatus};
    use crate::projection::build_projection;
    use crate::reconcile::TreeReconciler;
    use crate::tree::Viewport;

    fn setup() -> (GroupStore, RenderedTree) {
        let mut store = GroupStore::new();
        for name in ["A", "B", "C"] {
            store.create_group(name).unwrap();
        }
        store.assign(1, &GroupRef::named("A"), None).unwrap();
        store.assign(2, &GroupRef::named("A"), None).unwrap();
        store.assign(3, &GroupRef::named("B"), None).unwrap();
        let live: Vec<Item> = (1..=4)
            .map(|id| Item::new(id, format!("vm{}", id), ItemStatus::Running))
            .collect();
        let mut reconciler = TreeReconciler::new(Viewport::default());
        reconciler.reconcile(&build_projection(&live, &store, &FilterState::new()), &GestureState::idle());
        (store, reconciler.tree().clone())
    }

    #[test]
    fn test_item_drop_on_group_header() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Item(4));
        assert!(handler.state().is_mutating());

        let outcome = handler
            .drop_on(
                DropTarget::Node(NodeId::Group(GroupRef::named("B"))),
                &mut store,
                &tree,
                &RowGeometry::default(),
            )
            .unwrap();
        assert_eq!(
            outcome,
            DropOutcome::Moved {
                id: 4,
                from: GroupRef::Ungrouped,
                resolution: DropResolution::Direct(GroupRef::named("B")),
            }
        );
        assert_eq!(store.members("B"), Some(&[3, 4][..]));
        assert!(!handler.state().is_mutating());
    }

    #[test]
    fn test_item_drop_on_member_takes_its_slot() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Item(3));
        handler
            .drop_on(DropTarget::Node(NodeId::Item(1)), &mut store, &tree, &RowGeometry::default())
            .unwrap();
        assert_eq!(store.members("A"), Some(&[3, 1, 2][..]));
        assert_eq!(store.members("B"), Some(&[][..]));
    }

    #[test]
    fn test_position_hit_testing() {
        let (mut store, tree) = setup();
        // rows: A(0) vm1(1) vm2(2) B(3) vm3(4) C(5) Ungrouped(6) vm4(7)
        let geometry = RowGeometry {
            row_height: 10.0,
            tolerance: 5.0,
        };
        assert_eq!(
            geometry.resolve(&tree, 35.0),
            Resolved::Row(NodeId::Group(GroupRef::named("B")), GroupRef::named("B"))
        );
        assert_eq!(geometry.resolve(&tree, 83.0), Resolved::Near(GroupRef::Ungrouped));
        assert_eq!(geometry.resolve(&tree, 500.0), Resolved::Nothing);

        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Item(1));
        handler
            .drop_on(DropTarget::Position { y: 45.0 }, &mut store, &tree, &geometry)
            .unwrap();
        assert_eq!(store.group_of(1), GroupRef::named("B"));
    }

    #[test]
    fn test_unresolved_drop_falls_back_to_ungrouped() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Item(1));
        let outcome = handler
            .drop_on(DropTarget::Position { y: 9000.0 }, &mut store, &tree, &RowGeometry::default())
            .unwrap();
        assert_eq!(
            outcome,
            DropOutcome::Moved {
                id: 1,
                from: GroupRef::named("A"),
                resolution: DropResolution::FallbackUngrouped,
            }
        );
        assert_eq!(store.group_of(1), GroupRef::Ungrouped);
    }

    #[test]
    fn test_group_drop_reorders() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Group("A".into()));
        let outcome = handler
            .drop_on(
                DropTarget::Node(NodeId::Group(GroupRef::named("C"))),
                &mut store,
                &tree,
                &RowGeometry::default(),
            )
            .unwrap();
        assert!(matches!(outcome, DropOutcome::Reordered { .. }));
        assert_eq!(store.display_order(), &["B", "C", "A"]);
    }

    #[test]
    fn test_group_drop_onto_item_is_ignored() {
        let (mut store, tree) = setup();
        let before = store.display_order().to_vec();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Group("A".into()));
        let outcome = handler
            .drop_on(DropTarget::Node(NodeId::Item(3)), &mut store, &tree, &RowGeometry::default())
            .unwrap();
        assert_eq!(outcome, DropOutcome::NoChange);
        assert_eq!(store.display_order(), before.as_slice());
        assert!(!handler.state().is_mutating());
    }

    #[test]
    fn test_drop_on_deleted_group_falls_back_to_ungrouped() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Item(1));
        // the frozen tree still shows B
        store.delete_group("B").unwrap();

        let outcome = handler
            .drop_on(
                DropTarget::Node(NodeId::Group(GroupRef::named("B"))),
                &mut store,
                &tree,
                &RowGeometry::default(),
            )
            .unwrap();
        assert_eq!(
            outcome,
            DropOutcome::Moved {
                id: 1,
                from: GroupRef::named("A"),
                resolution: DropResolution::FallbackUngrouped,
            }
        );
        assert_eq!(store.group_of(1), GroupRef::Ungrouped);
        assert!(!store.contains_group("B"));
        assert!(!handler.state().is_mutating());
    }

    #[test]
    fn test_group_drop_with_stale_names_changes_nothing() {
        let (mut store, tree) = setup();
        let mut handler = DragDropHandler::new();
        handler.begin(DragSource::Group("gone".into()));
        let outcome = handler
            .drop_on(
                DropTarget::Node(NodeId::Group(GroupRef::named("A"))),
                &mut store,
                &tree,
                &RowGeometry::default(),
            )
            .unwrap();
        assert_eq!(outcome, DropOutcome::NoChange);
        assert!(!handler.state().is_mutating());

        handler.begin(DragSource::Group("A".into()));
        store.rename_group("C", "Cold").unwrap();
        let outcome = handler
            .drop_on(
                DropTarget::Node(NodeId::Group(GroupRef::named("C"))),
                &mut store,
                &tree,
                &RowGeometry::default(),
            )
            .unwrap();
        assert_eq!(outcome, DropOutcome::NoChange);
        assert_eq!(store.display_order(), &["A", "B", "Cold"]);
    }

    #[test]
    fn test_signals_and_cancel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut handler = DragDropHandler::new();
        handler.subscribe(move |signal| sink.lock().unwrap().push(signal.clone()));

        assert_eq!(handler.cancel(CancelReason::Aborted), None);
        handler.begin(DragSource::Item(1));
        let superseded = handler.begin(DragSource::Item(2));
        assert_eq!(superseded, Some(DropOutcome::Cancelled(CancelReason::Superseded)));
        assert_eq!(
            handler.cancel(CancelReason::LeftSurface),
            Some(DropOutcome::Cancelled(CancelReason::LeftSurface))
        );
        assert!(!handler.state().is_mutating());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                GestureSignal::Started(DragSource::Item(1)),
                GestureSignal::Ended,
                GestureSignal::Started(DragSource::Item(2)),
                GestureSignal::Ended,
            ]
        );
    }

    #[test]
    fn test_ungrouped_header_is_not_draggable() {
        assert_eq!(DragSource::from_node(&NodeId::Group(GroupRef::Ungrouped)), None);
        assert_eq!(
            DragSource::from_node(&NodeId::Item(7)),
            Some(DragSource::Item(7))
        );
    }
}
