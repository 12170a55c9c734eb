//! Relay server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::chat::engine::{EngineSettings, RelayEngine};
use crate::core::store::PersistenceGateway;

/// Where durable records live
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// `sqlite://` connection url
    Sqlite(String),
    /// Process memory, lost on restart
    Memory,
}

/// Configuration for the presence relay server
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Data root for on-disk state
    pub root_dir: PathBuf,
    /// Durable store backend
    pub store: StoreBackend,
    /// Single CORS origin; permissive when unset
    pub allowed_origin: Option<String>,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Upper bound on any single store call
    pub store_timeout: Option<Duration>,
    /// Max `text` length in bytes
    pub max_message_len: usize,
    /// Require `senderId` to match the uid announced on the connection
    pub enforce_sender: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let root_dir = PathBuf::from(relay_common::DEFAULT_ROOT);
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6500)),
            store: StoreBackend::Sqlite(sqlite_url(&relay_common::db_path_in(&root_dir))),
            root_dir,
            allowed_origin: None,
            outbound_buffer: 64,
            store_timeout: Some(Duration::from_millis(10_000)),
            max_message_len: 4096,
            enforce_sender: false,
        }
    }
}

fn sqlite_url(path: &std::path::Path) -> String {
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(None),
    }
}

impl RelayConfig {
    /// Build the config from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("PORT")? {
            config.bind_addr.set_port(port);
        }

        config.root_dir = relay_common::relay_root();
        config.store = match std::env::var("RELAY_DATABASE_URL") {
            Ok(url) if url.trim().eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Ok(url) if !url.trim().is_empty() => StoreBackend::Sqlite(url.trim().to_string()),
            _ => StoreBackend::Sqlite(sqlite_url(&relay_common::db_path_in(&config.root_dir))),
        };

        config.allowed_origin = std::env::var("RELAY_ALLOWED_ORIGIN")
            .ok()
            .filter(|origin| !origin.trim().is_empty());

        if let Some(buffer) = env_parse::<usize>("RELAY_OUTBOUND_BUFFER")? {
            anyhow::ensure!(buffer > 0, "RELAY_OUTBOUND_BUFFER must be at least 1");
            config.outbound_buffer = buffer;
        }
        if let Some(ms) = env_parse::<u64>("RELAY_STORE_TIMEOUT_MS")? {
            config.store_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(max) = env_parse::<usize>("RELAY_MAX_MESSAGE_LEN")? {
            config.max_message_len = max;
        }
        if let Some(enforce) = env_parse::<bool>("RELAY_ENFORCE_SENDER")? {
            config.enforce_sender = enforce;
        }

        Ok(config)
    }

    /// Ensure the on-disk layout exists when the store lives under the data root
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        if matches!(self.store, StoreBackend::Sqlite(_)) {
            relay_common::init_structure_at(&self.root_dir)?;
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_message_len: self.max_message_len,
            enforce_sender: self.enforce_sender,
        }
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub store: Arc<dyn PersistenceGateway>,
    pub engine: Arc<RelayEngine>,
}

impl AppState {
    /// Build the engine around `store`
    pub fn new(config: RelayConfig, store: Arc<dyn PersistenceGateway>) -> Self {
        let engine = Arc::new(RelayEngine::new(store.clone(), config.engine_settings()));
        Self {
            config,
            store,
            engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr.port(), 6500);
        assert_eq!(config.outbound_buffer, 64);
        assert!(!config.enforce_sender);
        match config.store {
            StoreBackend::Sqlite(url) => {
                assert!(url.starts_with("sqlite://"));
                assert!(url.ends_with("local/relay.sqlite"));
            }
            StoreBackend::Memory => panic!("default store should be sqlite"),
        }
    }

    #[test]
    fn test_engine_settings_follow_config() {
        let config = RelayConfig {
            max_message_len: 10,
            enforce_sender: true,
            ..Default::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.max_message_len, 10);
        assert!(settings.enforce_sender);
    }
}
