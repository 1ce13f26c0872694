use std::time::{Duration, Instant};

use crate::error::SessionError;
use crate::filter::StatusFilter;
use crate::gesture::{CancelReason, DragSource, DropOutcome, DropTarget};
use crate::model::{GroupRef, Item, ItemId, NodeId};
use crate::reconcile::ReconcileOutcome;
use crate::session::Session;
use crate::store::{StoreChange, StoreCommand};
use crate::tree::Viewport;

/// Everything that can happen to a session, as a value.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Store(StoreCommand),
    Unassign { id: ItemId },

    SetSearch { text: String },
    SetStatusFilter { filter: StatusFilter },
    CycleStatusFilter,
    ClearFilters,

    ToggleGroup { group: GroupRef },
    SetExpanded { group: GroupRef, expanded: bool },
    ExpandAll,
    CollapseAll,
    Select { node: NodeId, additive: bool },
    SetSelection { nodes: Vec<NodeId> },
    ClearSelection,
    Focus { node: Option<NodeId> },
    ScrollTo { offset: usize },
    ScrollBy { delta: isize },
    Resize { viewport: Viewport },

    PointerEntered,
    PointerLeft,
    DragStart { source: DragSource },
    Drop { target: DropTarget },
    DragCancel { reason: CancelReason },

    PauseRefresh,
    ResumeRefresh { interval: Option<Duration> },
    SetRefreshInterval { interval: Duration },
    RefreshNow,
    ItemsFetched { items: Vec<Item> },

    Save,
    /// Only meaningful to the runtime loop; a no-op for the session itself.
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct CommandEnvelope {
    pub id: u64,
    pub at: Instant,
    pub command: Command,
}

/// What applying one command did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Applied {
    pub change: Option<StoreChange>,
    pub gesture: Option<DropOutcome>,
    pub reconcile: Option<ReconcileOutcome>,
}

impl Applied {
    fn rebuilt(reconcile: ReconcileOutcome) -> Self {
        Self {
            reconcile: Some(reconcile),
            ..Self::default()
        }
    }
}

pub fn reduce(session: &mut Session, env: &CommandEnvelope) -> Result<Applied, SessionError> {
    let applied = match &env.command {
        Command::Store(command) => {
            let change = session.apply_store(command.clone())?;
            Applied {
                change: Some(change),
                reconcile: Some(session.rebuild()),
                ..Applied::default()
            }
        }
        Command::Unassign { id } => {
            let change = session.apply_store(StoreCommand::Assign {
                id: *id,
                target: GroupRef::Ungrouped,
                index: None,
            })?;
            Applied {
                change: Some(change),
                reconcile: Some(session.rebuild()),
                ..Applied::default()
            }
        }

        Command::SetSearch { text } => {
            session.filter.search_text = text.clone();
            Applied::rebuilt(session.rebuild())
        }
        Command::SetStatusFilter { filter } => {
            session.filter.status_filter = *filter;
            Applied::rebuilt(session.rebuild())
        }
        Command::CycleStatusFilter => {
            session.filter.cycle_status();
            Applied::rebuilt(session.rebuild())
        }
        Command::ClearFilters => {
            session.filter.clear();
            Applied::rebuilt(session.rebuild())
        }

        Command::ToggleGroup { group } => {
            session.reconciler.toggle_expansion(group);
            Applied::default()
        }
        Command::SetExpanded { group, expanded } => {
            session.reconciler.set_expanded(group, *expanded);
            Applied::default()
        }
        Command::ExpandAll => {
            session.reconciler.expand_all();
            Applied::default()
        }
        Command::CollapseAll => {
            session.reconciler.collapse_all();
            Applied::default()
        }
        Command::Select { node, additive } => {
            session.reconciler.select(node.clone(), *additive);
            Applied::default()
        }
        Command::SetSelection { nodes } => {
            session.reconciler.set_selection(nodes.iter().cloned());
            Applied::default()
        }
        Command::ClearSelection => {
            session.reconciler.clear_selection();
            Applied::default()
        }
        Command::Focus { node } => {
            session.reconciler.focus(node.clone());
            Applied::default()
        }
        Command::ScrollTo { offset } => {
            session.reconciler.scroll_to(*offset);
            Applied::default()
        }
        Command::ScrollBy { delta } => {
            session.reconciler.scroll_by(*delta);
            Applied::default()
        }
        Command::Resize { viewport } => {
            session.reconciler.set_viewport(*viewport);
            Applied::default()
        }

        Command::PointerEntered => {
            session.refresh.pointer_entered();
            Applied::default()
        }
        Command::PointerLeft => {
            session.refresh.pointer_left(env.at);
            Applied::default()
        }
        Command::DragStart { source } => Applied {
            gesture: session.gestures.begin(source.clone()),
            ..Applied::default()
        },
        Command::Drop { target } => {
            let outcome = session.gestures.drop_on(
                target.clone(),
                &mut session.store,
                session.reconciler.tree(),
                &session.geometry,
            );
            // Rebuilds were held back for the whole drag; catch up even
            // when the drop changed nothing or was rejected.
            let reconcile = session.rebuild();
            Applied {
                gesture: Some(outcome?),
                reconcile: Some(reconcile),
                ..Applied::default()
            }
        }
        Command::DragCancel { reason } => {
            let gesture = session.gestures.cancel(*reason);
            let reconcile = gesture.is_some().then(|| session.rebuild());
            Applied {
                gesture,
                reconcile,
                ..Applied::default()
            }
        }

        Command::PauseRefresh => {
            session.refresh.pause();
            Applied::default()
        }
        Command::ResumeRefresh { interval } => {
            session.refresh.resume(*interval);
            Applied::default()
        }
        Command::SetRefreshInterval { interval } => {
            session.refresh.set_interval(*interval, env.at);
            Applied::default()
        }
        Command::RefreshNow => {
            session.refresh.request();
            Applied::default()
        }
        Command::ItemsFetched { items } => Applied::rebuilt(session.ingest(items.clone())),

        Command::Save => {
            session.persist(true)?;
            Applied::default()
        }
        Command::Shutdown => Applied::default(),
    };
    Ok(applied)
}
