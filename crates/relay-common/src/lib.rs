//! Centralized data directory management for the presence relay
//!
//! Directory layout:
//! ```text
//! relay_data/
//! └── local/           # SQLite store (relay.sqlite)
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable that overrides the data root.
pub const ROOT_ENV: &str = "RELAY_ROOT";

/// Fallback data root when neither the environment nor a persisted config names one.
pub const DEFAULT_ROOT: &str = "relay_data";

const DB_FILE: &str = "relay.sqlite";

#[derive(Serialize, Deserialize, Debug, Default)]
struct RelayDirConfig {
    relay_root: Option<PathBuf>,
}

/// Get the global configuration path
fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("presence-relay").join("config.json"))
}

fn read_persisted_root(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<RelayDirConfig>(&content) {
            Ok(config) => config.relay_root,
            Err(e) => {
                warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file at {:?}: {}", path, e);
            None
        }
    }
}

/// Load the persistent root from the platform config file
pub fn load_persistent_root() -> Option<PathBuf> {
    read_persisted_root(&get_config_path()?)
}

/// Pick the data root: explicit override first, then the persisted root, then the default.
pub fn resolve_root(from_env: Option<String>, persisted: Option<PathBuf>) -> PathBuf {
    if let Some(val) = from_env.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(val);
    }
    persisted.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

/// Get the data root from `RELAY_ROOT`, the persistent config, or the default
pub fn relay_root() -> PathBuf {
    resolve_root(std::env::var(ROOT_ENV).ok(), load_persistent_root())
}

/// Local data directory under a given root
pub fn local_dir_in(root: &Path) -> PathBuf {
    root.join("local")
}

/// SQLite database path under a given root
pub fn db_path_in(root: &Path) -> PathBuf {
    local_dir_in(root).join(DB_FILE)
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Create the directory layout under `root` and return its canonical form
pub fn init_structure_at(root: &Path) -> anyhow::Result<PathBuf> {
    ensure_dir(root)?;
    ensure_dir(&local_dir_in(root))?;

    let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    info!("Relay directory structure initialized at: {:?}", canonical);
    Ok(canonical)
}
