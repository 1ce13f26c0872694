use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gesture::RowGeometry;
use crate::tree::Viewport;

/// Refresh loop settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RefreshConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Start with auto refresh running
    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    /// How long the pointer must be gone from the tree before a deferred
    /// tick may fire
    #[serde(default = "default_hover_debounce_ms")]
    pub hover_debounce_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            auto_refresh: true,
            hover_debounce_ms: default_hover_debounce_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn hover_debounce(&self) -> Duration {
        Duration::from_millis(self.hover_debounce_ms)
    }
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_hover_debounce_ms() -> u64 {
    100
}
fn default_true() -> bool {
    true
}

/// Tree surface metrics
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_viewport_rows")]
    pub viewport_rows: usize,

    /// Row height used for drop hit-testing
    #[serde(default = "default_row_height")]
    pub row_height: f32,

    /// Extra distance around a group's rows that still counts as a drop
    /// onto that group
    #[serde(default = "default_drop_tolerance")]
    pub drop_tolerance: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            viewport_rows: default_viewport_rows(),
            row_height: default_row_height(),
            drop_tolerance: default_drop_tolerance(),
        }
    }
}

impl LayoutConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            rows: self.viewport_rows,
        }
    }

    pub fn geometry(&self) -> RowGeometry {
        RowGeometry {
            row_height: self.row_height,
            tolerance: self.drop_tolerance,
        }
    }
}

fn default_viewport_rows() -> usize {
    20
}
fn default_row_height() -> f32 {
    24.0
}
fn default_drop_tolerance() -> f32 {
    5.0
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ProxtreeConfig {
    /// Config file version
    #[serde(default = "default_version")]
    pub version: String,

    /// Where group membership, order and expansion are persisted
    #[serde(default = "default_groups_file")]
    pub groups_file: PathBuf,

    /// Item list to poll; when unset the CLI falls back to its simulated
    /// source
    #[serde(default)]
    pub items_file: Option<PathBuf>,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for ProxtreeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            groups_file: default_groups_file(),
            items_file: None,
            refresh: RefreshConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1".into()
}
fn default_groups_file() -> PathBuf {
    PathBuf::from("resources/vm_groups.json")
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("refresh interval must be greater than zero")]
    InvalidInterval,
    #[error("invalid layout: {reason}")]
    InvalidLayout { reason: String },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl ProxtreeConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProxtreeConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let names = ["proxtree.yaml", "proxtree.yml", ".proxtree.yaml", ".proxtree.yml"];
        let mut searched = Vec::new();

        // Check environment variable first
        if let Ok(env_path) = std::env::var("PROXTREE_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        // Search current directory and parents
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &names {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Make relative file paths relative to the config file's directory.
    pub fn resolve_paths(mut self, config_path: &Path) -> Self {
        let Some(base) = config_path.parent() else {
            return self;
        };
        if self.groups_file.is_relative() {
            self.groups_file = base.join(&self.groups_file);
        }
        if let Some(items) = &self.items_file
            && items.is_relative()
        {
            self.items_file = Some(base.join(items));
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if !(self.layout.row_height > 0.0) {
            return Err(ConfigError::InvalidLayout {
                reason: format!("row_height must be positive, got {}", self.layout.row_height),
            });
        }
        if self.layout.drop_tolerance < 0.0 {
            return Err(ConfigError::InvalidLayout {
                reason: format!(
                    "drop_tolerance must not be negative, got {}",
                    self.layout.drop_tolerance
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_simple_config() {
        let yaml = r#"
version: "1"
groups_file: data/groups.json
refresh:
  interval_ms: 2500
  auto_refresh: false
layout:
  row_height: 18
"#;
        let config = ProxtreeConfig::from_str(yaml).unwrap();
        assert_eq!(config.groups_file, PathBuf::from("data/groups.json"));
        assert_eq!(config.refresh.interval(), Duration::from_millis(2500));
        assert!(!config.refresh.auto_refresh);
        assert_eq!(config.refresh.hover_debounce_ms, 100);
        assert_eq!(config.layout.geometry().row_height, 18.0);
        assert_eq!(config.layout.viewport(), Viewport { rows: 20 });
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProxtreeConfig::from_str("{}").unwrap();
        assert_eq!(config, ProxtreeConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ProxtreeConfig::from_str("refresh:\n  interval_ms: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidInterval)));
    }

    #[test]
    fn test_bad_layout_rejected() {
        let result = ProxtreeConfig::from_str("layout:\n  row_height: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidLayout { .. })));
    }

    #[test]
    fn test_discover_walks_up_and_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("proxtree.yaml"), "items_file: items.json\n").unwrap();

        let (path, config) = ProxtreeConfig::discover(&nested).unwrap();
        assert_eq!(path, dir.path().join("proxtree.yaml"));
        let config = config.resolve_paths(&path);
        assert_eq!(config.items_file, Some(dir.path().join("items.json")));
        assert_eq!(config.groups_file, dir.path().join("resources/vm_groups.json"));
    }
}
