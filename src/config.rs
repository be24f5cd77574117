use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::search::common::{DEFAULT_SEARCH_TIMEOUT_MS, DEFAULT_WRITER_HEAP_SIZE};

/// Application directory under the platform data dir
pub const APP_DIR_NAME: &str = "crawl-index";

/// Definition of one named index
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IndexConfig {
    pub name: String,

    /// Storage root; defaults to `<data_dir>/<name>`
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default = "default_true")]
    pub online: bool,

    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,
}

impl IndexConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            read_only: false,
            online: true,
            writer_heap_size: DEFAULT_WRITER_HEAP_SIZE,
        }
    }
}

/// Router configuration: an ordered list of index definitions
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default = "default_router_name")]
    pub name: String,

    /// Order is preserved and drives merge tie-breaking
    #[serde(default)]
    pub indices: Vec<IndexConfig>,

    /// Per-index budget for group searches
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Root for indexes without an explicit path
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: default_router_name(),
            indices: Vec::new(),
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            data_dir: None,
        }
    }
}

impl RouterConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RouterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a comma-separated list of index names
    pub fn from_index_names(names: &str) -> Result<Self, ConfigError> {
        let config = Self {
            indices: parse_index_names(names)
                .iter()
                .map(|name| IndexConfig::new(name))
                .collect(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Index names must be non-empty and unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for index in &self.indices {
            if index.name.trim().is_empty() {
                return Err(ConfigError::EmptyIndexName);
            }
            if !seen.insert(index.name.as_str()) {
                return Err(ConfigError::DuplicateIndex(index.name.clone()));
            }
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Root directory for indexes without an explicit path
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
        })
    }

    pub fn is_multi_index(&self) -> bool {
        self.indices.len() > 1
    }
}

/// Split a comma-separated list, trimming spaces and dropping empty entries
pub fn parse_index_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_writer_heap_size() -> usize {
    DEFAULT_WRITER_HEAP_SIZE
}

fn default_search_timeout_ms() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_MS
}

fn default_router_name() -> String {
    "default".to_string()
}
