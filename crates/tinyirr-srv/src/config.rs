//! Daemon configuration for tinyirrd.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tinyirr_mirror::RegistryConfig;

/// Configuration for a tinyirrd instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address (default: 0.0.0.0:8043).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory holding the `<registry>.tiny` snapshots.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Registries to mirror, keyed by the short name that also forms the
    /// query path segment.
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            state_dir: default_state_dir(),
            registries: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8043".parse().expect("valid default addr")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
