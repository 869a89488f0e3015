//! Directory-backed store: one JSON file per key under `<root>/<env>/`.
//!
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::SnapshotStore;
use crate::error::{Error, Result};

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the store directory for `env`.
    pub async fn open(root: impl AsRef<Path>, env: &str) -> Result<Self> {
        let dir = root.as_ref().join(env);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::Other(format!("invalid store key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

async fn with_timeout<T>(
    op: &str,
    fut: impl std::future::Future<Output = std::io::Result<T>>,
) -> Result<std::io::Result<T>> {
    tokio::time::timeout(TIMEOUT, fut)
        .await
        .map_err(|_| Error::Delivery(format!("{op} timed out after {TIMEOUT:?}")))
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match with_timeout("read", tokio::fs::read(&path)).await? {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(key.to_string()))
            }
            Err(e) => Err(Error::Delivery(format!("read {}: {e}", path.display()))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        with_timeout("write", tokio::fs::write(&tmp, data))
            .await?
            .map_err(|e| Error::Delivery(format!("write {}: {e}", tmp.display())))?;
        with_timeout("rename", tokio::fs::rename(&tmp, &path))
            .await?
            .map_err(|e| Error::Delivery(format!("rename into {}: {e}", path.display())))?;
        debug!(key, bytes = data.len(), "snapshot written");
        Ok(())
    }
}
