//! Background driver for a [`Session`].
//!
//! One task owns the session. Commands arrive over an mpsc channel, refresh
//! ticks come from the session's own coordinator, and every fully restored
//! tree is published on a watch channel. Subscribers therefore never see a
//! tree between teardown and restore.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gesture::GestureSignal;
use crate::reducer::Command;
use crate::refresh::TickDecision;
use crate::session::Session;
use crate::source::ItemSource;
use crate::tree::RenderedTree;

const COMMAND_BUFFER: usize = 256;
const SIGNAL_BUFFER: usize = 64;

pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    trees: watch::Receiver<Arc<RenderedTree>>,
    signals: broadcast::Sender<GestureSignal>,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn trees(&self) -> watch::Receiver<Arc<RenderedTree>> {
        self.trees.clone()
    }

    pub fn gesture_signals(&self) -> broadcast::Receiver<GestureSignal> {
        self.signals.subscribe()
    }

    /// Stop the loop, flush, and hand the session back.
    pub async fn shutdown(self) -> Option<Session> {
        let _ = self.commands.send(Command::Shutdown).await;
        match self.task.await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "session task failed");
                None
            }
        }
    }
}

pub fn spawn(mut session: Session, source: Box<dyn ItemSource>) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (tree_tx, tree_rx) = watch::channel(Arc::new(session.tree().clone()));
    let (signal_tx, _) = broadcast::channel(SIGNAL_BUFFER);

    let sink = signal_tx.clone();
    session.gestures_mut().subscribe(move |signal| {
        // no subscribers is fine
        let _ = sink.send(signal.clone());
    });

    let task = tokio::spawn(run(session, source, command_rx, tree_tx));
    SessionHandle {
        commands: command_tx,
        trees: tree_rx,
        signals: signal_tx,
        task,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn publish(trees: &watch::Sender<Arc<RenderedTree>>, tree: &RenderedTree) {
    trees.send_if_modified(|current| {
        if current.as_ref() == tree {
            false
        } else {
            *current = Arc::new(tree.clone());
            true
        }
    });
}

async fn run(
    mut session: Session,
    mut source: Box<dyn ItemSource>,
    mut commands: mpsc::Receiver<Command>,
    trees: watch::Sender<Arc<RenderedTree>>,
) -> Session {
    info!(source = source.name(), "session loop started");

    loop {
        let wake = session.next_wakeup(Instant::now());
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                if command == Command::Shutdown {
                    break;
                }
                if let Err(e) = session.apply(command) {
                    warn!(error = %e, "command rejected");
                }
            }
            _ = sleep_until(wake) => {
                match session.poll(Instant::now()) {
                    TickDecision::Fire => match source.fetch().await {
                        Ok(items) => {
                            session.ingest(items);
                        }
                        Err(e) => {
                            warn!(source = source.name(), error = %e, "fetch failed, keeping previous tree");
                        }
                    },
                    decision => debug!(?decision, "refresh tick not fired"),
                }
            }
        }

        publish(&trees, session.tree());
        if let Err(e) = session.persist(false) {
            warn!(error = %e, "could not save group file");
        }
    }

    if let Err(e) = session.persist(false) {
        warn!(error = %e, "could not save group file on shutdown");
    }
    info!("session loop stopped");
    session
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::gesture::DragSource;
    use crate::model::{GroupRef, Item, ItemStatus};
    use crate::persist::{GroupFile, GroupFileWriter};
    use crate::session::SessionOptions;
    use crate::source::StaticSource;
    use crate::store::{GroupStore, StoreCommand};

    fn options() -> SessionOptions {
        SessionOptions {
            interval: Duration::from_millis(20),
            ..SessionOptions::default()
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item::new(1, "alpha", ItemStatus::Running),
            Item::new(2, "beta", ItemStatus::Stopped),
        ]
    }

    async fn wait_for(
        trees: &mut watch::Receiver<Arc<RenderedTree>>,
        check: impl Fn(&RenderedTree) -> bool,
    ) -> Arc<RenderedTree> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let tree = trees.borrow_and_update().clone();
                if check(&tree) {
                    return tree;
                }
                trees.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_tick_publishes_tree() {
        let session = Session::new(GroupStore::new(), BTreeMap::new(), options());
        let handle = spawn(session, Box::new(StaticSource::new(items())));
        let mut trees = handle.trees();

        let tree = wait_for(&mut trees, |tree| tree.row_count() == 3).await;
        assert_eq!(tree.groups.len(), 1);
        assert_eq!(tree.summary.running, 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_flow_through_and_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vm_groups.json");
        let session = Session::open(GroupFileWriter::new(&path), options());
        let handle = spawn(session, Box::new(StaticSource::new(items())));
        let mut trees = handle.trees();

        assert!(
            handle
                .send(Command::Store(StoreCommand::CreateGroup { name: "Prod".into() }))
                .await
        );
        assert!(
            handle
                .send(Command::Store(StoreCommand::Assign {
                    id: 2,
                    target: GroupRef::named("Prod"),
                    index: None,
                }))
                .await
        );
        wait_for(&mut trees, |tree| {
            tree.group(&GroupRef::named("Prod"))
                .is_some_and(|node| node.contains_item(2))
        })
        .await;

        let session = handle.shutdown().await.unwrap();
        assert!(!session.store().is_dirty());
        let saved = GroupFile::load(&path).unwrap().unwrap();
        assert_eq!(saved.groups.get("Prod"), Some(&vec![2]));
    }

    #[tokio::test]
    async fn test_gesture_signals_are_broadcast() {
        let session = Session::new(GroupStore::new(), BTreeMap::new(), options());
        let handle = spawn(session, Box::new(StaticSource::new(items())));
        let mut signals = handle.gesture_signals();

        handle.send(Command::DragStart { source: DragSource::Item(1) }).await;
        handle
            .send(Command::DragCancel {
                reason: crate::gesture::CancelReason::Aborted,
            })
            .await;

        let started = tokio::time::timeout(Duration::from_secs(5), signals.recv()).await.unwrap();
        assert_eq!(started.unwrap(), GestureSignal::Started(DragSource::Item(1)));
        let ended = tokio::time::timeout(Duration::from_secs(5), signals.recv()).await.unwrap();
        assert_eq!(ended.unwrap(), GestureSignal::Ended);
        handle.shutdown().await.unwrap();
    }
}
