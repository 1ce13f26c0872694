//! On-disk group file
//!
//! ```json
//! {
//!   "groups": { "Prod": [101, 102] },
//!   "group_order": ["Prod"],
//!   "ungrouped_vms": [103],
//!   "group_expansion_state": { "Prod": true }
//! }
//! ```
//!
//! `ungrouped_vms` is an advisory snapshot recomputed from the live list on
//! every save; it is read back but never used for membership.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::PersistError;
use crate::model::{GroupName, ItemId};
use crate::store::GroupStore;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupFile {
    #[serde(default)]
    pub groups: BTreeMap<GroupName, Vec<ItemId>>,
    #[serde(default)]
    pub group_order: Vec<GroupName>,
    #[serde(default)]
    pub ungrouped_vms: Vec<ItemId>,
    #[serde(default)]
    pub group_expansion_state: BTreeMap<GroupName, bool>,
}

impl GroupFile {
    pub fn from_store(
        store: &GroupStore,
        live_ids: &[ItemId],
        expansion: BTreeMap<GroupName, bool>,
    ) -> Self {
        Self {
            groups: store
                .group_names()
                .map(|name| {
                    let members = store.members(name).unwrap_or_default().to_vec();
                    (name.clone(), members)
                })
                .collect(),
            group_order: store.display_order().to_vec(),
            ungrouped_vms: store.ungrouped(live_ids),
            group_expansion_state: expansion,
        }
    }

    pub fn into_store(self) -> (GroupStore, BTreeMap<GroupName, bool>) {
        let store = GroupStore::from_parts(self.groups, self.group_order);
        (store, self.group_expansion_state)
    }

    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a group file. A missing file is the cold-start state and yields
    /// `None`; anything else that goes wrong is reported to the caller.
    pub fn load(path: &Path) -> Result<Option<Self>, PersistError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json(&content).map(Some)
    }

    /// Load, falling back to an empty store on any failure. The core must
    /// always be able to start. A file that exists but cannot be parsed is
    /// copied aside first, so the next save does not destroy it.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(file)) => file,
            Ok(None) => {
                info!(path = %path.display(), "no group file yet, starting empty");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load group file, starting empty");
                match backup_unreadable(path) {
                    Ok(backup) => {
                        warn!(backup = %backup.display(), "unreadable group file copied aside")
                    }
                    Err(e) => warn!(error = %e, "could not back up unreadable group file"),
                }
                Self::default()
            }
        }
    }
}

/// First free `<file>.corrupt`, `<file>.corrupt.1`, ... next to `path`.
fn backup_path(path: &Path) -> PathBuf {
    let base = format!("{}.corrupt", path.display());
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

fn backup_unreadable(path: &Path) -> Result<PathBuf, PersistError> {
    let backup = backup_path(path);
    std::fs::copy(path, &backup).map_err(|source| PersistError::Io {
        path: backup.clone(),
        source,
    })?;
    Ok(backup)
}

/// Owns durability for the group file: the store only flags itself dirty,
/// this writer decides when to flush and does it atomically.
#[derive(Clone, Debug)]
pub struct GroupFileWriter {
    path: PathBuf,
}

impl GroupFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store if it is dirty (or `force` is set). Returns whether a
    /// write happened.
    pub fn flush(
        &self,
        store: &mut GroupStore,
        live_ids: &[ItemId],
        expansion: BTreeMap<GroupName, bool>,
        force: bool,
    ) -> Result<bool, PersistError> {
        if !store.is_dirty() && !force {
            return Ok(false);
        }
        let revision = store.revision();
        let file = GroupFile::from_store(store, live_ids, expansion);
        self.write(&file)?;
        store.mark_clean(revision);
        info!(path = %self.path.display(), groups = file.groups.len(), "group file saved");
        Ok(true)
    }

    pub fn write(&self, file: &GroupFile) -> Result<(), PersistError> {
        let content = file.to_json()?;
        let io_err = |source: std::io::Error| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::model::GroupRef;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources").join("vm_groups.json");
        let writer = GroupFileWriter::new(&path);

        let mut store = GroupStore::new();
        store.create_group("Prod").unwrap();
        store.create_group("Lab").unwrap();
        store.assign(20, &GroupRef::named("Prod"), None).unwrap();
        store.assign(10, &GroupRef::named("Prod"), None).unwrap();

        let expansion = BTreeMap::from([("Prod".to_string(), false)]);
        assert!(writer.flush(&mut store, &[10, 20, 30], expansion, false).unwrap());
        assert!(!store.is_dirty());

        let loaded = GroupFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.ungrouped_vms, vec![30]);
        assert_eq!(loaded.group_order, vec!["Prod".to_string(), "Lab".to_string()]);

        let (restored, expansion) = loaded.into_store();
        assert_eq!(restored.members("Prod"), Some(&[20, 10][..]));
        assert_eq!(restored.members("Lab"), Some(&[][..]));
        assert_eq!(expansion.get("Prod"), Some(&false));
        assert!(!restored.is_dirty());
    }

    #[test]
    fn test_flush_skips_clean_store() {
        let dir = TempDir::new().unwrap();
        let writer = GroupFileWriter::new(dir.path().join("groups.json"));
        let mut store = GroupStore::new();
        assert!(!writer.flush(&mut store, &[], BTreeMap::new(), false).unwrap());
        assert!(!writer.path().exists());
        assert!(writer.flush(&mut store, &[], BTreeMap::new(), true).unwrap());
        assert!(writer.path().exists());
    }

    #[test]
    fn test_missing_file_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        assert!(GroupFile::load(&path).unwrap().is_none());
        assert_eq!(GroupFile::load_or_default(&path), GroupFile::default());
    }

    #[test]
    fn test_malformed_file_reports_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.json");
        std::fs::write(&path, "not json {{{").unwrap();
        assert!(matches!(GroupFile::load(&path), Err(PersistError::Json(_))));
        assert_eq!(GroupFile::load_or_default(&path), GroupFile::default());
    }

    #[test]
    fn test_malformed_file_is_kept_before_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.json");
        std::fs::write(&path, r#"{"groups": {"Prod": [1, 2]"#).unwrap();

        let (mut store, _) = GroupFile::load_or_default(&path).into_store();
        store.create_group("X").unwrap();
        let writer = GroupFileWriter::new(&path);
        assert!(writer.flush(&mut store, &[], BTreeMap::new(), true).unwrap());

        let backup = dir.path().join("groups.json.corrupt");
        assert_eq!(
            std::fs::read_to_string(&backup).unwrap(),
            r#"{"groups": {"Prod": [1, 2]"#
        );

        // a second bad load keeps the first backup
        std::fs::write(&path, "garbage").unwrap();
        GroupFile::load_or_default(&path);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("groups.json.corrupt.1")).unwrap(),
            "garbage"
        );
        assert!(std::fs::read_to_string(&backup).unwrap().starts_with("{\"groups\""));
    }

    #[test]
    fn test_ungrouped_cache_is_not_authoritative() {
        let json = r#"{
            "groups": {"Prod": [1, 2]},
            "group_order": ["Prod"],
            "ungrouped_vms": [1, 2, 3]
        }"#;
        let (store, _) = GroupFile::from_json(json).unwrap().into_store();
        assert_eq!(store.group_of(1), GroupRef::named("Prod"));
        assert_eq!(store.ungrouped(&[1, 2, 3]), vec![3]);
    }

    #[test]
    fn test_minimal_object_uses_defaults() {
        let file = GroupFile::from_json("{}").unwrap();
        assert!(file.groups.is_empty());
        assert!(file.group_order.is_empty());
        assert!(file.group_expansion_state.is_empty());
    }
}
