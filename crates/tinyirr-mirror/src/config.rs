//! Mirror configuration for one registry.

use serde::{Deserialize, Serialize};

/// Where and how to mirror one registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// URL whose body is the registry's current serial as decimal text.
    pub serial_url: String,

    /// URL of the full database dump. A path ending in `.gz` is
    /// decompressed on the fly.
    pub dump_url: String,

    /// NRTM mirror host. Realtime sync runs only when both host and port
    /// are present.
    #[serde(default)]
    pub realtime_host: Option<String>,

    /// NRTM mirror port.
    #[serde(default)]
    pub realtime_port: Option<u16>,

    /// Mirror-side database name used in the `-g` request. Defaults to
    /// the registry's short name.
    #[serde(default)]
    pub int_name: Option<String>,
}

impl RegistryConfig {
    /// The `(host, port)` pair when realtime sync is configured.
    pub fn realtime_addr(&self) -> Option<(&str, u16)> {
        match (self.realtime_host.as_deref(), self.realtime_port) {
            (Some(host), Some(port)) => Some((host, port)),
            _ => None,
        }
    }
}
