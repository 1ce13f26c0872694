use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type ItemId = u64;
pub type GroupName = String;

/// Observed power state of a remote VM.
///
/// Anything that is not literally `running` (paused, suspended, prelaunch...)
/// is kept verbatim in `Other` so it can round-trip, but filters and sorting
/// treat it as not running.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Running,
    #[default]
    Stopped,
    Other(String),
}

impl ItemStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Other(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Sort key: running first, everything else after.
    pub fn priority(&self) -> u8 {
        if self.is_running() { 0 } else { 1 }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for ItemStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ItemStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

/// One remote resource as last observed by a poll.
///
/// Items are rebuilt wholesale on every tick; `id` is the only identity that
/// carries across ticks. Fields other than id/name/status are passed through
/// untouched in `extra` (cpu, mem, uptime, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(alias = "vmid")]
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            extra: serde_json::Map::new(),
        }
    }
}

/// Where an item lives: a user-created group or the implicit ungrouped bucket.
///
/// The bucket is a variant rather than a reserved name so a user can call a
/// group anything, including whatever the UI labels the bucket.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupRef {
    Named(GroupName),
    Ungrouped,
}

impl GroupRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Ungrouped => None,
        }
    }

    pub fn is_ungrouped(&self) -> bool {
        matches!(self, Self::Ungrouped)
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Ungrouped => "Ungrouped",
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "group '{}'", name),
            Self::Ungrouped => write!(f, "ungrouped bucket"),
        }
    }
}

/// Stable identity of a rendered row, used to carry selection and focus
/// across rebuilds. Never a pointer into a previous tree.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Group(GroupRef),
    Item(ItemId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(group) => write!(f, "{}", group),
            Self::Item(id) => write!(f, "item {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(ItemStatus::from_wire("running"), ItemStatus::Running);
        assert_eq!(ItemStatus::from_wire("Stopped"), ItemStatus::Stopped);
        assert_eq!(
            ItemStatus::from_wire("paused"),
            ItemStatus::Other("paused".into())
        );
        assert_eq!(ItemStatus::Running.priority(), 0);
        assert_eq!(ItemStatus::Other("paused".into()).priority(), 1);
    }

    #[test]
    fn test_item_decodes_proxmox_record() {
        let json = r#"{"vmid": 101, "name": "web", "status": "running", "cpu": 0.12, "maxmem": 2048}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, 101);
        assert_eq!(item.name, "web");
        assert!(item.status.is_running());
        assert_eq!(item.extra.get("maxmem"), Some(&serde_json::json!(2048)));
    }

    #[test]
    fn test_group_ref_ordering_puts_ungrouped_last() {
        let mut refs = vec![GroupRef::Ungrouped, GroupRef::named("b"), GroupRef::named("a")];
        refs.sort();
        assert_eq!(refs.last(), Some(&GroupRef::Ungrouped));
    }
}
