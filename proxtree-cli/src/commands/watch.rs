//! `proxtree watch` - run the refresh loop and print every new tree
//!
//! Lines on stdin are turned into session commands:
//!
//! ```text
//! search <text>      search (no text clears it)
//! status <mode>      all | running | stopped
//! cycle | clear      cycle the status filter | clear all filters
//! toggle <group>     expand-all | collapse-all
//! create <name>      rename <old> <new> | delete <name>
//! assign <id> <group>  unassign <id> | move <group> <onto>
//! drag <id>|@<group> drop <group>|#<id>|y=<px> | cancel
//! select <id>|@<group>  focus <id>|@<group> | scroll <row>
//! hover | leave      pointer over / off the tree
//! pause | resume [ms] | interval <ms> | refresh
//! save | quit
//! ```
//!
//! `~` names the ungrouped bucket wherever a group is expected. Group names
//! with spaces go in double quotes.

use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use proxtree_core::filter::FilterState;
use proxtree_core::gesture::{CancelReason, DragSource, DropTarget};
use proxtree_core::model::{GroupRef, ItemId, NodeId};
use proxtree_core::reducer::Command;
use proxtree_core::runtime;
use proxtree_core::store::StoreCommand;

use super::{parse_group_ref, parse_status};
use crate::AppContext;
use crate::render::{status_line, visible_lines};

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many trees have been printed
    #[arg(long)]
    ticks: Option<usize>,

    /// Poll interval in milliseconds, overriding the config
    #[arg(long)]
    interval_ms: Option<u64>,
}

pub async fn run_watch(ctx: &AppContext, args: WatchArgs) -> anyhow::Result<()> {
    let mut config = ctx.config.clone();
    if let Some(ms) = args.interval_ms {
        config.refresh.interval_ms = ms.max(1);
    }
    let session = ctx.open_session();
    let source = ctx.item_source();
    info!(source = source.name(), interval_ms = config.refresh.interval_ms, "watching");

    let handle = runtime::spawn(session, source);
    if args.interval_ms.is_some() {
        handle
            .send(Command::SetRefreshInterval {
                interval: config.refresh.interval(),
            })
            .await;
    }

    let mut trees = handle.trees();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut filter = FilterState::new();
    let mut printed = 0usize;

    loop {
        tokio::select! {
            changed = trees.changed() => {
                if changed.is_err() {
                    break;
                }
                let tree = trees.borrow_and_update().clone();
                for line in visible_lines(&tree) {
                    println!("{}", line);
                }
                println!("-- {}", status_line(&tree, &filter));
                printed += 1;
                if args.ticks.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(Command::Shutdown)) => break,
                    Ok(Some(command)) => {
                        track_filter(&mut filter, &command);
                        if !handle.send(command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Mirror filter commands locally so the status line can show them.
fn track_filter(filter: &mut FilterState, command: &Command) {
    match command {
        Command::SetSearch { text } => filter.search_text = text.clone(),
        Command::SetStatusFilter { filter: status } => filter.status_filter = *status,
        Command::CycleStatusFilter => filter.cycle_status(),
        Command::ClearFilters => filter.clear(),
        _ => {}
    }
}

fn parse_id(raw: &str) -> Result<ItemId, String> {
    raw.parse().map_err(|_| format!("'{}' is not an item id", raw))
}

/// `@name` is a group, anything else an item id.
fn parse_node(raw: &str) -> Result<NodeId, String> {
    match raw.strip_prefix('@') {
        Some(group) => Ok(NodeId::Group(parse_group_ref(group))),
        None => parse_id(raw).map(NodeId::Item),
    }
}

fn parse_drop_target(raw: &str) -> Result<DropTarget, String> {
    if let Some(y) = raw.strip_prefix("y=") {
        let y = y.parse().map_err(|_| format!("'{}' is not a coordinate", y))?;
        return Ok(DropTarget::Position { y });
    }
    if let Some(id) = raw.strip_prefix('#') {
        return parse_id(id).map(|id| DropTarget::Node(NodeId::Item(id)));
    }
    Ok(DropTarget::Node(NodeId::Group(parse_group_ref(raw))))
}

fn parse_ms(raw: &str) -> Result<Duration, String> {
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(format!("'{}' is not a positive number of milliseconds", raw)),
    }
}

/// Whitespace-separated words; double quotes group words that contain
/// spaces (`rename "My Group" Lab`).
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

pub fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let words = split_words(line)?;
    let Some((verb, rest)) = words.split_first() else {
        return Ok(None);
    };
    let verb = verb.as_str();
    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    let arg = |index: usize| {
        args.get(index)
            .copied()
            .ok_or_else(|| format!("'{}' needs more arguments", verb))
    };

    let command = match verb {
        "search" => Command::SetSearch { text: args.join(" ") },
        "status" => Command::SetStatusFilter {
            filter: parse_status(arg(0)?)?,
        },
        "cycle" => Command::CycleStatusFilter,
        "clear" => Command::ClearFilters,

        "toggle" => Command::ToggleGroup {
            group: parse_group_ref(arg(0)?),
        },
        "expand-all" => Command::ExpandAll,
        "collapse-all" => Command::CollapseAll,
        "select" => Command::Select {
            node: parse_node(arg(0)?)?,
            additive: false,
        },
        "focus" => Command::Focus {
            node: Some(parse_node(arg(0)?)?),
        },
        "scroll" => Command::ScrollTo {
            offset: arg(0)?
                .parse()
                .map_err(|_| "scroll needs a row number".to_string())?,
        },

        "create" => Command::Store(StoreCommand::CreateGroup {
            name: args.join(" "),
        }),
        "rename" => Command::Store(StoreCommand::RenameGroup {
            old: arg(0)?.to_string(),
            new: arg(1)?.to_string(),
        }),
        "delete" => Command::Store(StoreCommand::DeleteGroup {
            name: arg(0)?.to_string(),
        }),
        "assign" => Command::Store(StoreCommand::Assign {
            id: parse_id(arg(0)?)?,
            target: parse_group_ref(arg(1)?),
            index: None,
        }),
        "unassign" => Command::Unassign {
            id: parse_id(arg(0)?)?,
        },
        "move" => Command::Store(StoreCommand::MoveGroup {
            source: arg(0)?.to_string(),
            target: arg(1)?.to_string(),
        }),

        "drag" => {
            let source = match parse_node(arg(0)?)? {
                NodeId::Item(id) => DragSource::Item(id),
                NodeId::Group(GroupRef::Named(name)) => DragSource::Group(name),
                NodeId::Group(GroupRef::Ungrouped) => {
                    return Err("the ungrouped bucket cannot be dragged".to_string());
                }
            };
            Command::DragStart { source }
        }
        "drop" => Command::Drop {
            target: parse_drop_target(arg(0)?)?,
        },
        "cancel" => Command::DragCancel {
            reason: CancelReason::Aborted,
        },
        "hover" => Command::PointerEntered,
        "leave" => Command::PointerLeft,

        "pause" => Command::PauseRefresh,
        "resume" => Command::ResumeRefresh {
            interval: args.first().map(|raw| parse_ms(raw)).transpose()?,
        },
        "interval" => Command::SetRefreshInterval {
            interval: parse_ms(arg(0)?)?,
        },
        "refresh" => Command::RefreshNow,
        "save" => Command::Save,
        "quit" | "exit" => Command::Shutdown,
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}
