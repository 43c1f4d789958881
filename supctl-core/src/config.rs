pub mod ecosystem;
pub mod loader;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

pub use ecosystem::{EcosystemApp, EcosystemConfig};
pub use loader::ConfigLoader;

use crate::registry::Registry;

static DEFAULT_SOCKET: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("supctl.sock")
});

static DEFAULT_LOG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("logs")
});

pub fn default_socket_path() -> PathBuf {
    DEFAULT_SOCKET.clone()
}

pub fn default_log_dir() -> PathBuf {
    DEFAULT_LOG_DIR.clone()
}

/// Daemon-level settings (the registry file itself only declares apps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub grace_secs: u64,
    pub reload_poll_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_dir: default_log_dir(),
            grace_secs: 10,
            reload_poll_secs: 5,
        }
    }
}

impl DaemonConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn reload_poll(&self) -> Duration {
        Duration::from_secs(self.reload_poll_secs)
    }
}

/// Watches the registry file by content checksum so a reload is only
/// applied when the declarations actually changed.
pub struct RegistryWatcher {
    path: PathBuf,
    current: ArcSwap<Registry>,
    checksum: RwLock<Vec<u8>>,
}

impl RegistryWatcher {
    pub async fn new(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let registry = Registry::load(&path).await?;
        let checksum = Self::compute_checksum(&path).await?;
        Ok(Self {
            path,
            current: ArcSwap::new(Arc::new(registry)),
            checksum: RwLock::new(checksum),
        })
    }

    async fn compute_checksum(path: &Path) -> crate::Result<Vec<u8>> {
        let content = fs::read(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(&content);
        Ok(hasher.finalize().to_vec())
    }

    /// Re-reads the file if its checksum changed. Returns whether a new
    /// registry was swapped in. A file that changed but fails validation is
    /// reported as an error and the previous registry stays active.
    pub async fn check_reload(&self) -> crate::Result<bool> {
        let new_checksum = Self::compute_checksum(&self.path).await?;
        if *self.checksum.read() == new_checksum {
            return Ok(false);
        }
        let registry = Registry::load(&self.path).await?;
        self.current.store(Arc::new(registry));
        *self.checksum.write() = new_checksum;
        Ok(true)
    }

    /// Unconditionally re-read and swap in the registry file.
    pub async fn force_reload(&self) -> crate::Result<Arc<Registry>> {
        let registry = Arc::new(Registry::load(&self.path).await?);
        let checksum = Self::compute_checksum(&self.path).await?;
        self.current.store(registry.clone());
        *self.checksum.write() = checksum;
        Ok(registry)
    }

    pub fn get(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
