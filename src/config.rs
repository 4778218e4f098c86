//! Store configuration
//!
//! `StoreConfig` carries the connection and import options. Hosts keep it
//! in a TOML table; every field is optional and falls back to its default.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Connection and import options for a card store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Compact the freshly imported store before handing it back
    pub vacuum_after_import: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            vacuum_after_import: true,
        }
    }
}

impl StoreConfig {
    /// Parse options from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Create the parent directory of a store file if it is missing
pub fn ensure_db_dir(db_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
