//! One tree surface and everything that feeds it.
//!
//! A `Session` owns the store, the filter, the reconciler, the drag handler
//! and the refresh coordinator, and is only ever driven through
//! [`Session::apply`]. That single entry point is what keeps store
//! mutations, drops and rebuilds from interleaving.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ProxtreeConfig;
use crate::error::{PersistError, SessionError, StoreError};
use crate::filter::FilterState;
use crate::gesture::{DragDropHandler, GestureState, RowGeometry};
use crate::model::{GroupName, Item, ItemId};
use crate::persist::{GroupFile, GroupFileWriter};
use crate::projection::{Projection, build_projection};
use crate::reconcile::{ReconcileOutcome, TreeReconciler};
use crate::reducer::{Applied, Command, CommandEnvelope, reduce};
use crate::refresh::{RefreshCoordinator, TickDecision};
use crate::store::{GroupStore, StoreChange, StoreCommand};
use crate::tree::{RenderedTree, Viewport};

#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub viewport: Viewport,
    pub geometry: RowGeometry,
    pub interval: Duration,
    pub hover_debounce: Duration,
    pub auto_refresh: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ProxtreeConfig::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &ProxtreeConfig) -> Self {
        Self {
            viewport: config.layout.viewport(),
            geometry: config.layout.geometry(),
            interval: config.refresh.interval(),
            hover_debounce: config.refresh.hover_debounce(),
            auto_refresh: config.refresh.auto_refresh,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub(crate) store: GroupStore,
    pub(crate) filter: FilterState,
    pub(crate) reconciler: TreeReconciler,
    pub(crate) gestures: DragDropHandler,
    pub(crate) refresh: RefreshCoordinator,
    pub(crate) geometry: RowGeometry,
    pub(crate) items: Vec<Item>,
    writer: Option<GroupFileWriter>,
    persisted_expansion: BTreeMap<GroupName, bool>,
    next_command_id: u64,
}

impl Session {
    pub fn new(
        store: GroupStore,
        saved_expansion: BTreeMap<GroupName, bool>,
        options: SessionOptions,
    ) -> Self {
        let mut refresh = RefreshCoordinator::new(options.interval, options.hover_debounce);
        if !options.auto_refresh {
            refresh.pause();
        }
        Self {
            store,
            filter: FilterState::new(),
            reconciler: TreeReconciler::new(options.viewport).with_saved_expansion(&saved_expansion),
            gestures: DragDropHandler::new(),
            refresh,
            geometry: options.geometry,
            items: Vec::new(),
            writer: None,
            persisted_expansion: saved_expansion,
            next_command_id: 0,
        }
    }

    /// Open the group file behind `writer` and attach it for saving. A
    /// missing or unreadable file starts an empty store.
    pub fn open(writer: GroupFileWriter, options: SessionOptions) -> Self {
        let (store, expansion) = GroupFile::load_or_default(writer.path()).into_store();
        info!(
            path = %writer.path().display(),
            groups = store.group_count(),
            "group store loaded"
        );
        let mut session = Self::new(store, expansion, options);
        session.writer = Some(writer);
        session
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn tree(&self) -> &RenderedTree {
        self.reconciler.tree()
    }

    pub fn reconciler(&self) -> &TreeReconciler {
        &self.reconciler
    }

    pub fn gesture(&self) -> &GestureState {
        self.gestures.state()
    }

    pub fn gestures_mut(&mut self) -> &mut DragDropHandler {
        &mut self.gestures
    }

    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn live_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn apply(&mut self, command: Command) -> Result<Applied, SessionError> {
        self.apply_at(command, Instant::now())
    }

    pub fn apply_at(&mut self, command: Command, at: Instant) -> Result<Applied, SessionError> {
        self.next_command_id += 1;
        let env = CommandEnvelope {
            id: self.next_command_id,
            at,
            command,
        };
        reduce(self, &env)
    }

    pub fn projection(&self) -> Projection {
        build_projection(&self.items, &self.store, &self.filter)
    }

    /// Re-project the cached items and reconcile.
    pub fn rebuild(&mut self) -> ReconcileOutcome {
        let projection = self.projection();
        self.reconciler.reconcile(&projection, self.gestures.state())
    }

    pub fn ingest(&mut self, items: Vec<Item>) -> ReconcileOutcome {
        debug!(count = items.len(), "items fetched");
        self.items = items;
        self.rebuild()
    }

    pub fn poll(&mut self, now: Instant) -> TickDecision {
        self.refresh.poll(now, self.gestures.state())
    }

    pub fn next_wakeup(&self, now: Instant) -> Option<Instant> {
        self.refresh.next_wakeup(now)
    }

    /// Store mutation plus the bookkeeping that keeps saved UI state keyed to
    /// current group names.
    pub(crate) fn apply_store(&mut self, command: StoreCommand) -> Result<StoreChange, StoreError> {
        let change = self.store.apply(command)?;
        match &change {
            StoreChange::GroupRenamed { old, new } => self.reconciler.rename_group(old, new),
            StoreChange::GroupDeleted { name, .. } => self.reconciler.forget_group(name),
            _ => {}
        }
        Ok(change)
    }

    /// Flush the group file when the store is dirty, the saved expansion
    /// changed, or `force` is set. Without a writer this is a no-op.
    pub fn persist(&mut self, force: bool) -> Result<bool, PersistError> {
        let Some(writer) = &self.writer else {
            return Ok(false);
        };
        let expansion = self.reconciler.saved_expansion();
        let expansion_changed = expansion != self.persisted_expansion;
        let live_ids: Vec<ItemId> = self.items.iter().map(|item| item.id).collect();
        let written = writer.flush(
            &mut self.store,
            &live_ids,
            expansion.clone(),
            force || expansion_changed,
        )?;
        if written {
            self.persisted_expansion = expansion;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::model::{GroupRef, ItemStatus, NodeId};

    fn live() -> Vec<Item> {
        vec![
            Item::new(10, "web-10", ItemStatus::Running),
            Item::new(20, "db-20", ItemStatus::Running),
            Item::new(30, "misc-30", ItemStatus::Stopped),
        ]
    }

    fn visible_ids(tree: &RenderedTree, group: &GroupRef) -> Vec<ItemId> {
        tree.group(group)
            .map(|node| node.items.iter().map(|item| item.id).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_group_search_and_clear_flow() {
        let mut session = Session::new(GroupStore::new(), BTreeMap::new(), SessionOptions::default());
        session.apply(Command::ItemsFetched { items: live() }).unwrap();
        session
            .apply(Command::Store(StoreCommand::CreateGroup { name: "Prod".into() }))
            .unwrap();
        for id in [10, 20] {
            session
                .apply(Command::Store(StoreCommand::Assign {
                    id,
                    target: GroupRef::named("Prod"),
                    index: None,
                }))
                .unwrap();
        }
        let prod = GroupRef::named("Prod");
        assert_eq!(visible_ids(session.tree(), &prod), vec![20, 10]);

        session.apply(Command::SetExpanded { group: prod.clone(), expanded: false }).unwrap();
        session.apply(Command::SetSearch { text: "20".into() }).unwrap();
        let node = session.tree().group(&prod).unwrap();
        assert!(node.expanded);
        assert_eq!(visible_ids(session.tree(), &prod), vec![20]);

        session.apply(Command::ClearFilters).unwrap();
        assert!(!session.tree().group(&prod).unwrap().expanded);
        assert_eq!(visible_ids(session.tree(), &GroupRef::Ungrouped), vec![30]);
    }

    #[test]
    fn test_rejected_store_command_leaves_tree_alone() {
        let mut session = Session::new(GroupStore::new(), BTreeMap::new(), SessionOptions::default());
        session.apply(Command::ItemsFetched { items: live() }).unwrap();
        let before = session.tree().clone();
        let result = session.apply(Command::Store(StoreCommand::DeleteGroup { name: "nope".into() }));
        assert!(matches!(result, Err(SessionError::Store(StoreError::UnknownGroup { .. }))));
        assert_eq!(session.tree(), &before);
    }

    #[test]
    fn test_open_and_persist_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vm_groups.json");
        {
            let mut session = Session::open(GroupFileWriter::new(&path), SessionOptions::default());
            session.apply(Command::ItemsFetched { items: live() }).unwrap();
            session
                .apply(Command::Store(StoreCommand::CreateGroup { name: "Lab".into() }))
                .unwrap();
            session.apply(Command::Unassign { id: 30 }).unwrap();
            session
                .apply(Command::Store(StoreCommand::Assign {
                    id: 30,
                    target: GroupRef::named("Lab"),
                    index: None,
                }))
                .unwrap();
            // Lab was first shown empty, so it is already collapsed
            assert!(!session.tree().group(&GroupRef::named("Lab")).unwrap().expanded);
            session
                .apply(Command::SetExpanded {
                    group: GroupRef::named("Lab"),
                    expanded: false,
                })
                .unwrap();
            assert!(session.persist(false).unwrap());
            assert!(!session.persist(false).unwrap());
        }

        let mut session = Session::open(GroupFileWriter::new(&path), SessionOptions::default());
        assert_eq!(session.store().members("Lab"), Some(&[30][..]));
        session.apply(Command::ItemsFetched { items: live() }).unwrap();
        assert!(!session.tree().group(&GroupRef::named("Lab")).unwrap().expanded);
    }

    #[test]
    fn test_rename_keeps_selection_on_group() {
        let mut session = Session::new(GroupStore::new(), BTreeMap::new(), SessionOptions::default());
        session
            .apply(Command::Store(StoreCommand::CreateGroup { name: "Prod".into() }))
            .unwrap();
        session.apply(Command::ItemsFetched { items: live() }).unwrap();
        session
            .apply(Command::Select {
                node: NodeId::Group(GroupRef::named("Prod")),
                additive: false,
            })
            .unwrap();
        session
            .apply(Command::Store(StoreCommand::RenameGroup {
                old: "Prod".into(),
                new: "Production".into(),
            }))
            .unwrap();
        assert!(
            session
                .tree()
                .selection
                .contains(&NodeId::Group(GroupRef::named("Production")))
        );
    }

    #[test]
    fn test_auto_refresh_off_starts_paused() {
        let options = SessionOptions {
            auto_refresh: false,
            ..SessionOptions::default()
        };
        let mut session = Session::new(GroupStore::new(), BTreeMap::new(), options);
        assert!(session.refresh().is_paused());
        assert_eq!(session.poll(Instant::now()), TickDecision::Idle);
    }
}
