mod groups;
mod tree;
mod watch;

pub use groups::{GroupsCommand, run_groups};
pub use tree::{TreeArgs, run_tree};
pub use watch::{WatchArgs, run_watch};

use proxtree_core::filter::StatusFilter;
use proxtree_core::model::GroupRef;

/// `~` names the ungrouped bucket on the command line; anything else is a
/// group name.
pub fn parse_group_ref(raw: &str) -> GroupRef {
    if raw == "~" {
        GroupRef::Ungrouped
    } else {
        GroupRef::named(raw)
    }
}

pub fn parse_status(raw: &str) -> Result<StatusFilter, String> {
    StatusFilter::parse(raw).ok_or_else(|| format!("unknown status filter '{}', expected all|running|stopped", raw))
}
