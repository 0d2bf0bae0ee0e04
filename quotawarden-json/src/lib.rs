//! JSON file snapshot store for `quotawarden`.
//! One file holds the latest snapshot; bring your own path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use quotawarden::{PersistenceError, Snapshot, SnapshotStore};
use tokio::io::AsyncWriteExt;

#[derive(Clone, Debug)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unique per save, so overlapping saves never rename each other's file.
    fn temp_path(&self) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    async fn write_temp(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load_snapshot(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        snapshot.check_version()?;
        tracing::debug!(
            target: "quotawarden::json",
            path = %self.path.display(),
            entries = snapshot.len(),
            "loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let tmp = self.temp_path();
        let written = match Self::write_temp(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(
            target: "quotawarden::json",
            path = %self.path.display(),
            entries = snapshot.len(),
            bytes = bytes.len(),
            "saved snapshot"
        );
        Ok(())
    }
}
