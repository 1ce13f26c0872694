use std::path::PathBuf;

/// Rejected group store mutations. The store is left untouched when one of
/// these is returned.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("group '{name}' already exists")]
    DuplicateGroup { name: String },
    #[error("group '{name}' does not exist")]
    UnknownGroup { name: String },
    #[error("invalid group name '{name}'")]
    InvalidGroupName { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed group file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("item source unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("could not read items from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decode item list: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Source(#[from] SourceError),
}
