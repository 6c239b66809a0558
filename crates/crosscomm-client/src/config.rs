//! Client Configuration
//!
//! [`ClientConfig`] holds everything a relay client needs before it connects:
//! the server address, identity, heartbeat timing, dispatch mode and the
//! object store used for file transfers. It can be loaded from and saved to a
//! TOML file:
//!
//! ```toml
//! host = "relay.local"
//! port = 9898
//! client_id = "workstation"
//! heartbeat_interval_secs = 30
//! dispatch_mode = "sequential"
//!
//! [store]
//! backend = "local"
//! root = "/var/lib/crosscomm/bucket"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crosscomm_core::{ClientId, LocalDirStore, MemoryStore, SharedStore, DEFAULT_NAMESPACE};

use crate::error::ConfigError;
use crate::listeners::DispatchMode;

/// Default relay host
pub const DEFAULT_HOST: &str = "localhost";

/// Default relay port
pub const DEFAULT_PORT: u16 = 9898;

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Object store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// File transfer disabled
    #[default]
    None,
    /// Process-local map; only useful when sender and receiver share a process
    Memory,
    /// Directory acting as a bucket
    Local,
}

/// Object store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Bucket directory for the `local` backend
    pub root: Option<PathBuf>,
}

impl StoreConfig {
    /// Directory-backed store rooted at `root`
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Local,
            root: Some(root.into()),
        }
    }

    /// Open the configured store; `None` when file transfer is disabled
    pub fn build(&self) -> Result<Option<SharedStore>, ConfigError> {
        match self.backend {
            StoreBackend::None => Ok(None),
            StoreBackend::Memory => Ok(Some(Arc::new(MemoryStore::new()))),
            StoreBackend::Local => {
                let root = self.root.as_ref().ok_or_else(|| {
                    ConfigError::Validation("Local store requires a root directory".to_string())
                })?;
                Ok(Some(Arc::new(LocalDirStore::open(root)?)))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Configuration for one relay client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay server host
    pub host: String,
    /// Relay server port
    pub port: u16,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
    /// Explicit client id; generated from the device id when absent
    pub client_id: Option<String>,
    /// Seconds between heartbeat envelopes
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which the server drops a client
    pub heartbeat_timeout_secs: u64,
    /// Upper bound on opening the transport
    pub connect_timeout_secs: u64,
    /// First segment of every store key
    pub store_namespace: String,
    /// How matching listeners are invoked
    pub dispatch_mode: DispatchMode,
    /// Object store for file, image and folder transfers
    pub store: StoreConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secure: false,
            client_id: None,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            connect_timeout_secs: 10,
            store_namespace: DEFAULT_NAMESPACE.to_string(),
            dispatch_mode: DispatchMode::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for a relay at `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the heartbeat interval; the timeout grows to twice the interval
    /// when it would otherwise be shorter than it
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_secs = interval.as_secs().max(1);
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            self.heartbeat_timeout_secs = self.heartbeat_interval_secs * 2;
        }
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// WebSocket URL of the relay
    pub fn server_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Configured client id, or a freshly generated one
    pub fn resolve_client_id(&self) -> ClientId {
        match &self.client_id {
            Some(id) => ClientId::new(id.clone()),
            None => ClientId::generate(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load and validate a TOML configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("Host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("Port must be greater than 0".to_string()));
        }
        if let Some(id) = &self.client_id {
            if id.is_empty() {
                return Err(ConfigError::Validation("Client id must not be empty".to_string()));
            }
            if id == crosscomm_core::SERVER_ID || id == crosscomm_core::BROADCAST_ID {
                return Err(ConfigError::Validation(format!(
                    "Client id '{}' is a reserved address",
                    id
                )));
            }
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(ConfigError::Validation(
                "Heartbeat timeout must not be shorter than the heartbeat interval".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.store_namespace.is_empty() || self.store_namespace.contains('/') {
            return Err(ConfigError::Validation(
                "Store namespace must be a single non-empty key segment".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Local && self.store.root.is_none() {
            return Err(ConfigError::Validation(
                "Local store requires a root directory".to_string(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
