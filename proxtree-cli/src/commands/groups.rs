//! `proxtree groups` - edit group membership and order from the shell

use clap::Subcommand;
use tracing::warn;

use proxtree_core::model::{GroupRef, ItemId};
use proxtree_core::reducer::Command;
use proxtree_core::store::{GroupStore, StoreChange, StoreCommand};

use super::parse_group_ref;
use crate::AppContext;

#[derive(Subcommand)]
pub enum GroupsCommand {
    /// Show groups in display order with their members
    List,
    Create {
        name: String,
    },
    Rename {
        old: String,
        new: String,
    },
    /// Delete a group; its members become ungrouped
    Delete {
        name: String,
    },
    /// Move an item into a group (`~` for ungrouped)
    Assign {
        id: ItemId,
        group: String,
        /// Position inside the group's member list
        #[arg(long)]
        index: Option<usize>,
    },
    Unassign {
        id: ItemId,
    },
    /// Set the display order; groups left out keep their relative order at
    /// the end
    Order {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Move a group into the slot currently held by another
    Move {
        source: String,
        target: String,
    },
}

impl GroupsCommand {
    fn into_command(self) -> Option<Command> {
        let command = match self {
            Self::List => return None,
            Self::Create { name } => StoreCommand::CreateGroup { name },
            Self::Rename { old, new } => StoreCommand::RenameGroup { old, new },
            Self::Delete { name } => StoreCommand::DeleteGroup { name },
            Self::Assign { id, group, index } => StoreCommand::Assign {
                id,
                target: parse_group_ref(&group),
                index,
            },
            Self::Unassign { id } => return Some(Command::Unassign { id }),
            Self::Order { names } => StoreCommand::SetGroupOrder { names },
            Self::Move { source, target } => StoreCommand::MoveGroup { source, target },
        };
        Some(Command::Store(command))
    }
}

pub async fn run_groups(ctx: &AppContext, command: GroupsCommand) -> anyhow::Result<()> {
    let mut session = ctx.open_session();

    // Live ids keep the advisory ungrouped list in the file current. Not
    // being able to fetch them is no reason to refuse an edit, and the
    // simulated fleet has no business in a real group file.
    if ctx.config.items_file.is_some() {
        match ctx.fetch_items().await {
            Ok(items) => {
                session.apply(Command::ItemsFetched { items })?;
            }
            Err(e) => warn!(error = %e, "continuing without live items"),
        }
    }

    let Some(command) = command.into_command() else {
        print_groups(session.store(), &session.live_ids());
        return Ok(());
    };

    let applied = session.apply(command)?;
    if let Some(change) = &applied.change {
        println!("{}", describe(change));
    }
    session.persist(true)?;
    Ok(())
}

fn describe(change: &StoreChange) -> String {
    match change {
        StoreChange::GroupCreated { name } => format!("created group '{}'", name),
        StoreChange::GroupRenamed { old, new } => format!("renamed '{}' to '{}'", old, new),
        StoreChange::GroupDeleted { name, released } if released.is_empty() => {
            format!("deleted group '{}'", name)
        }
        StoreChange::GroupDeleted { name, released } => format!(
            "deleted group '{}', {} item(s) now ungrouped",
            name,
            released.len()
        ),
        StoreChange::Assigned { id, group: GroupRef::Ungrouped } => format!("{} is now ungrouped", id),
        StoreChange::Assigned { id, group } => format!("moved {} to '{}'", id, group.label()),
        StoreChange::OrderChanged => "group order updated".to_string(),
        StoreChange::Unchanged => "nothing to change".to_string(),
    }
}

fn print_groups(store: &GroupStore, live_ids: &[ItemId]) {
    if store.group_count() == 0 {
        println!("no groups yet");
    }
    for name in store.display_order() {
        let members = store.members(name).unwrap_or_default();
        let shown: Vec<String> = members
            .iter()
            .map(|id| {
                if live_ids.is_empty() || live_ids.contains(id) {
                    id.to_string()
                } else {
                    format!("{}?", id)
                }
            })
            .collect();
        println!("{} ({}): {}", name, members.len(), shown.join(" "));
    }
    if !live_ids.is_empty() {
        let ungrouped = store.ungrouped(live_ids);
        let shown: Vec<String> = ungrouped.iter().map(ToString::to_string).collect();
        println!("~ ungrouped ({}): {}", ungrouped.len(), shown.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_assign_to_tilde_means_ungrouped() {
        let command = GroupsCommand::Assign {
            id: 5,
            group: "~".into(),
            index: None,
        };
        assert_eq!(
            command.into_command(),
            Some(Command::Store(StoreCommand::Assign {
                id: 5,
                target: GroupRef::Ungrouped,
                index: None,
            }))
        );
        assert_eq!(GroupsCommand::List.into_command(), None);
    }

    #[test]
    fn test_describe_changes() {
        assert_eq!(
            describe(&StoreChange::GroupDeleted {
                name: "Lab".into(),
                released: vec![1, 2],
            }),
            "deleted group 'Lab', 2 item(s) now ungrouped"
        );
        assert_eq!(
            describe(&StoreChange::Assigned {
                id: 7,
                group: GroupRef::named("Prod"),
            }),
            "moved 7 to 'Prod'"
        );
    }
}
