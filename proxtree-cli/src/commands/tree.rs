//! `proxtree tree` - fetch once, project, print

use clap::Args;

use proxtree_core::filter::StatusFilter;
use proxtree_core::reducer::Command;

use super::parse_status;
use crate::AppContext;
use crate::render::{status_line, tree_lines};

#[derive(Args)]
pub struct TreeArgs {
    /// Case-insensitive substring of the name, or part of the id
    #[arg(short, long)]
    search: Option<String>,

    /// all | running | stopped
    #[arg(long, value_parser = parse_status)]
    status: Option<StatusFilter>,

    /// Collapse every group and remember it, as if done by hand. Filters
    /// still auto-expand groups with matches.
    #[arg(long)]
    collapsed: bool,
}

impl TreeArgs {
    fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.collapsed {
            commands.push(Command::CollapseAll);
        }
        if let Some(text) = &self.search {
            commands.push(Command::SetSearch { text: text.clone() });
        }
        if let Some(filter) = self.status {
            commands.push(Command::SetStatusFilter { filter });
        }
        commands
    }
}

pub async fn run_tree(ctx: &AppContext, args: TreeArgs) -> anyhow::Result<()> {
    let mut session = ctx.open_session();
    let items = ctx.fetch_items().await?;
    session.apply(Command::ItemsFetched { items })?;
    for command in args.commands() {
        session.apply(command)?;
    }

    for line in tree_lines(session.tree()) {
        println!("{}", line);
    }
    println!();
    println!("{}", status_line(session.tree(), session.filter()));

    // a freshly loaded file may have been repaired
    session.persist(false)?;
    Ok(())
}
