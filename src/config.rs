//! Configuration file support for the flipchain node.
//!
//! Loads optional `flipchain.toml` from the data directory given on the
//! command line. If no config file exists, defaults are used.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::node::events::{ChannelEventSink, NodeEvent};
use crate::node::validation::IdentityStateValidator;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "flipchain.toml";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlipchainConfig {
    pub node: NodeConfig,
    pub keys_pool: KeysPoolConfig,
}

/// Node configuration section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// `tracing_subscriber` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            log_filter: "info".into(),
        }
    }
}

/// Keys pool configuration section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KeysPoolConfig {
    /// Capacity of the channel carrying admitted-key events.
    pub event_capacity: usize,
    /// Largest flip key material the identity validator accepts.
    pub max_key_bytes: usize,
}

impl Default for KeysPoolConfig {
    fn default() -> Self {
        KeysPoolConfig {
            event_capacity: crate::constants::EVENT_CHANNEL_CAPACITY,
            max_key_bytes: crate::constants::MAX_FLIP_KEY_BYTES,
        }
    }
}

impl KeysPoolConfig {
    /// Identity validator enforcing the configured key size limit.
    pub fn validator(&self) -> IdentityStateValidator {
        IdentityStateValidator::new(self.max_key_bytes)
    }

    /// Event sink with the configured channel capacity, and its receiver.
    pub fn event_sink(&self) -> (ChannelEventSink, mpsc::Receiver<NodeEvent>) {
        ChannelEventSink::new(self.event_capacity)
    }
}

/// Errors reading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl FlipchainConfig {
    /// Read `flipchain.toml` from the given directory.
    ///
    /// `Ok(None)` when the file does not exist.
    pub fn read(data_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse { path, source })
    }

    /// Settle the outcome of [`read`](Self::read): defaults when the file is
    /// missing, and a warning plus defaults when it cannot be read or parsed.
    /// Call once the tracing subscriber is installed.
    pub fn resolve(loaded: Result<Option<Self>, ConfigError>) -> Self {
        match loaded {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }
}
