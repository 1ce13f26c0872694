use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SourceError;
use crate::model::Item;

/// Where the live item list comes from.
///
/// Implementations:
/// - `JsonFileSource`: reads a dumped list (plain array or `{"data": [...]}`)
/// - `StaticSource`: a fixed list, for tests and one-shot projections
///
/// A failed fetch leaves the previous tree in place; the runtime logs it and
/// tries again on the next tick.
#[async_trait]
pub trait ItemSource: Send {
    async fn fetch(&mut self) -> Result<Vec<Item>, SourceError>;

    /// Get the name of this source implementation
    fn name(&self) -> &'static str;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemList {
    Plain(Vec<Item>),
    Wrapped { data: Vec<Item> },
}

pub fn parse_items(content: &str) -> Result<Vec<Item>, SourceError> {
    let list: ItemList = serde_json::from_str(content)?;
    Ok(match list {
        ItemList::Plain(items) | ItemList::Wrapped { data: items } => items,
    })
}

#[derive(Clone, Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ItemSource for JsonFileSource {
    async fn fetch(&mut self) -> Result<Vec<Item>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_items(&content)
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    items: Vec<Item>,
}

impl StaticSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ItemSource for StaticSource {
    async fn fetch(&mut self) -> Result<Vec<Item>, SourceError> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::model::ItemStatus;

    #[test]
    fn test_parse_plain_and_wrapped() {
        let plain = r#"[{"vmid": 100, "name": "web", "status": "running"}]"#;
        let wrapped = r#"{"data": [{"vmid": 100, "name": "web", "status": "running"}]}"#;
        let expected = vec![Item::new(100, "web", ItemStatus::Running)];
        assert_eq!(parse_items(plain).unwrap(), expected);
        assert_eq!(parse_items(wrapped).unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_items("{\"nope\": 1}"), Err(SourceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_json_file_source_reads_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"[{"id": 7, "name": "db", "status": "stopped"}]"#).unwrap();

        let mut source = JsonFileSource::new(&path);
        let items = source.fetch().await.unwrap();
        assert_eq!(items, vec![Item::new(7, "db", ItemStatus::Stopped)]);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(source.fetch().await, Err(SourceError::Io { .. })));
    }
}
