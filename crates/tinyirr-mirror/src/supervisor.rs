//! Per-registry lifecycle supervision.
//!
//! One task per configured registry: import the last snapshot, fall back
//! to a full bootstrap when it is missing or corrupt, publish the index
//! into the shared map, then keep it current over NRTM. Registries fail
//! and recover independently; nothing here is fatal to the process.

use crate::bootstrap;
use crate::config::RegistryConfig;
use crate::nrtm::{Session, SessionSummary};
use crate::{MirrorError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tinyirr_core::{snapshot, RegistryIndex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Delay before reopening a realtime session after an error or `%END`.
const RECONNECT_DELAY: Duration = Duration::from_secs(60);
/// Delay before retrying a registry whose bootstrap failed.
const BOOTSTRAP_RETRY: Duration = Duration::from_secs(600);

/// One registry's index behind its reader/writer lock.
pub type SharedIndex = Arc<RwLock<RegistryIndex>>;

/// The live registry set, shared between sync tasks and the query layer.
pub type Registries = Arc<RwLock<HashMap<String, SharedIndex>>>;

/// Snapshot file for one registry.
pub fn snapshot_path(state_dir: &Path, registry: &str) -> PathBuf {
    state_dir.join(format!("{registry}.tiny"))
}

/// Spawn a lifecycle task for every configured registry.
pub fn spawn_all(
    configs: impl IntoIterator<Item = (String, RegistryConfig)>,
    state_dir: &Path,
    registries: &Registries,
) {
    let client = reqwest::Client::builder()
        .user_agent(concat!("tinyirr/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client");

    for (name, cfg) in configs {
        tokio::spawn(run_registry(
            name,
            cfg,
            state_dir.to_path_buf(),
            registries.clone(),
            client.clone(),
        ));
    }
}

/// Run one registry's lifecycle until process exit.
pub async fn run_registry(
    registry: String,
    cfg: RegistryConfig,
    state_dir: PathBuf,
    registries: Registries,
    client: reqwest::Client,
) {
    let path = snapshot_path(&state_dir, &registry);

    let index = match snapshot::read_file(&path) {
        Ok(index) => {
            info!(registry = %registry, serial = index.serial, "snapshot imported");
            index
        }
        Err(err) => {
            warn!(registry = %registry, error = %err, "snapshot import failed, bootstrapping");
            loop {
                match bootstrap::load(&client, &registry, &cfg).await {
                    Ok(index) => {
                        if let Err(err) = snapshot::write_file(&path, &index) {
                            warn!(registry = %registry, error = %err, "snapshot write failed");
                        }
                        break index;
                    }
                    Err(err) => {
                        warn!(
                            registry = %registry,
                            error = %err,
                            retry_secs = BOOTSTRAP_RETRY.as_secs(),
                            "bootstrap failed, will retry"
                        );
                        tokio::time::sleep(BOOTSTRAP_RETRY).await;
                    }
                }
            }
        }
    };

    let shared: SharedIndex = Arc::new(RwLock::new(index));
    registries
        .write()
        .await
        .insert(registry.clone(), shared.clone());

    let Some((host, port)) = cfg.realtime_addr() else {
        info!(registry = %registry, "no realtime mirror configured, serving static load");
        return;
    };
    let host = host.to_string();
    let db = cfg.int_name.clone().unwrap_or_else(|| registry.clone());

    loop {
        let start_serial = shared.read().await.serial;
        match sync_once(&host, port, &db, start_serial, &shared).await {
            Ok(summary) => {
                maybe_snapshot(&registry, &path, &shared, summary).await;
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Err(MirrorError::Idle) => {
                // The poll timer fired on a silent connection; reopen
                // immediately with the current serial.
                debug!(registry = %registry, "mirror idle, reopening session");
            }
            Err(err) => {
                warn!(
                    registry = %registry,
                    error = %err,
                    retry_secs = RECONNECT_DELAY.as_secs(),
                    "realtime session failed"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn sync_once(
    host: &str,
    port: u16,
    db: &str,
    start_serial: u32,
    index: &RwLock<RegistryIndex>,
) -> Result<SessionSummary> {
    let stream = tokio::net::TcpStream::connect((host, port)).await?;
    Session::new(start_serial).run(stream, db, index).await
}

// A session with no applied deltas leaves the snapshot alone.
async fn maybe_snapshot(registry: &str, path: &Path, shared: &SharedIndex, summary: SessionSummary) {
    if summary.applied == 0 {
        return;
    }
    let guard = shared.read().await;
    if let Err(err) = snapshot::write_file(path, &guard) {
        warn!(registry, error = %err, "snapshot write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            snapshot_path(Path::new("/var/lib/tinyirr"), "radb"),
            PathBuf::from("/var/lib/tinyirr/radb.tiny")
        );
    }

    #[tokio::test]
    async fn test_maybe_snapshot_skips_empty_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), "test");
        let shared: SharedIndex = Arc::new(RwLock::new(RegistryIndex::new(5)));

        maybe_snapshot("test", &path, &shared, SessionSummary { serial: 5, applied: 0 }).await;
        assert!(!path.exists());

        maybe_snapshot("test", &path, &shared, SessionSummary { serial: 6, applied: 1 }).await;
        assert_eq!(snapshot::read_file(&path).unwrap().serial, 5);
    }
}
