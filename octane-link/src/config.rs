//! Connection configuration.
//!
//! Config file lives at `~/.config/octane-link/link.toml` unless a path is
//! given explicitly. `OCTANE_LINK_ADDRESS` overrides the server address.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionManager, GrpcConnector};
use crate::error::{Error, Result};
use crate::pool::DEFAULT_MAX_CALLBACKS;
use crate::registry::CallbackRegistry;

/// Address the renderer's gRPC server listens on by default.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:51022";
/// Environment variable overriding `server_address`.
pub const ADDRESS_ENV: &str = "OCTANE_LINK_ADDRESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Renderer endpoint: `host:port`, `http(s)://host:port` or `unix:/path`.
    pub server_address: String,
    /// Token identifying this client to the renderer when running as a
    /// module inside the renderer process.
    pub callback_source: Option<String>,
    /// Outstanding callbacks allowed per signature.
    pub max_callbacks_per_type: u32,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            callback_source: None,
            max_callbacks_per_type: DEFAULT_MAX_CALLBACKS,
            connect_timeout_ms: None,
            request_timeout_ms: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("octane-link")
        .join("link.toml")
}

impl LinkConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("can't read {}: {e}", path.display())))?;
        Self::from_toml(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config file if there is one, otherwise defaults.
    /// Problems with the file are logged, not fatal. The address
    /// environment override is applied last.
    pub fn load_or_default() -> Self {
        let path = default_config_path();
        let mut config = if path.exists() {
            match Self::load(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("ignoring config file: {e}");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            if !address.trim().is_empty() {
                self.server_address = address;
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("can't create {}: {e}", dir.display())))?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| Error::Config(format!("can't write {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_callbacks_per_type == 0 {
            return Err(Error::Config(
                "max_callbacks_per_type must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connector(&self) -> GrpcConnector {
        GrpcConnector {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn connection_manager(&self) -> ConnectionManager<GrpcConnector> {
        ConnectionManager::new(self.connector(), self.server_address.clone())
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        Arc::new(CallbackRegistry::new(self.max_callbacks_per_type))
    }

    pub fn callback_source(&self) -> &str {
        self.callback_source.as_deref().unwrap_or_default()
    }
}
