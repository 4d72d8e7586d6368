//! Persistence and byte storage collaborators.
//!
//! [`MemoryStore`] keeps everything in process and backs tests and
//! embedding. [`FsStore`] lays records out under a root directory:
//!
//! ```text
//! <root>/targets/<id>.json
//! <root>/configurations/<name>.json
//! <root>/builds/<build_id>.log     one status per line
//! <root>/builds/<build_id>.json    final outcome
//! <root>/<path>                    blobs and uploads
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use stackpack_common::error::{Result, StackpackError};
use stackpack_common::types::{BuildId, TargetId};
pub use stackpack_package::ArtifactStore;
use tokio::io::AsyncWriteExt;

use crate::model::{BuildOutcome, BuildStatus, Configuration, Target};

/// Source of build inputs and sink for build state.
pub trait BuildRecords: Send + Sync {
    /// Loads a target with its members.
    fn load_target(&self, id: &TargetId) -> impl Future<Output = Result<Target>> + Send;

    /// Loads a configuration by name; `None` when it does not exist.
    fn load_configuration(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Configuration>>> + Send;

    /// Persists the coarse status of a build.
    fn record_status(
        &self,
        build_id: &BuildId,
        status: BuildStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persists the final outcome of a build.
    fn record_outcome(&self, outcome: &BuildOutcome) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    targets: HashMap<TargetId, Target>,
    configurations: HashMap<String, Configuration>,
    blobs: HashMap<String, Vec<u8>>,
    statuses: Vec<(BuildId, BuildStatus)>,
    outcomes: HashMap<BuildId, BuildOutcome>,
}

/// In-process implementation of both collaborators. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Adds or replaces a target.
    pub fn insert_target(&self, target: Target) {
        self.with(|s| {
            let _ = s.targets.insert(target.id.clone(), target);
        });
    }

    /// Adds or replaces a configuration.
    pub fn insert_configuration(&self, configuration: Configuration) {
        self.with(|s| {
            let _ = s.configurations.insert(configuration.name.clone(), configuration);
        });
    }

    /// Adds or replaces a blob.
    pub fn insert_blob(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.with(|s| {
            let _ = s.blobs.insert(path.into(), bytes.into());
        });
    }

    /// Bytes stored at `path`, including uploads.
    #[must_use]
    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.with(|s| s.blobs.get(path).cloned())
    }

    /// Every status recorded for a build, in order.
    #[must_use]
    pub fn statuses(&self, build_id: &BuildId) -> Vec<BuildStatus> {
        self.with(|s| {
            s.statuses
                .iter()
                .filter(|(id, _)| id == build_id)
                .map(|(_, status)| *status)
                .collect()
        })
    }

    /// Final outcome of a build.
    #[must_use]
    pub fn outcome(&self, build_id: &BuildId) -> Option<BuildOutcome> {
        self.with(|s| s.outcomes.get(build_id).cloned())
    }
}

impl ArtifactStore for MemoryStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.blob(path).ok_or_else(|| StackpackError::NotFound {
            kind: "blob",
            id: path.to_string(),
        })
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.insert_blob(path, bytes);
        Ok(format!("memory://{path}"))
    }
}

impl BuildRecords for MemoryStore {
    async fn load_target(&self, id: &TargetId) -> Result<Target> {
        self.with(|s| s.targets.get(id).cloned())
            .ok_or_else(|| StackpackError::NotFound {
                kind: "target",
                id: id.to_string(),
            })
    }

    async fn load_configuration(&self, name: &str) -> Result<Option<Configuration>> {
        Ok(self.with(|s| s.configurations.get(name).cloned()))
    }

    async fn record_status(&self, build_id: &BuildId, status: BuildStatus) -> Result<()> {
        self.with(|s| s.statuses.push((build_id.clone(), status)));
        Ok(())
    }

    async fn record_outcome(&self, outcome: &BuildOutcome) -> Result<()> {
        self.with(|s| {
            let _ = s.outcomes.insert(outcome.build_id.clone(), outcome.clone());
        });
        Ok(())
    }
}

/// Filesystem implementation of both collaborators.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a store path under the root, refusing to leave it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StackpackError::Config {
                message: format!("store path {path:?} must be relative and stay under the root"),
            });
        }
        Ok(self.root.join(relative))
    }

    fn build_path(&self, build_id: &BuildId, extension: &str) -> PathBuf {
        self.root
            .join("builds")
            .join(format!("{}.{extension}", build_id.as_str()))
    }

    async fn read(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StackpackError::io(path, e))
    }

    async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StackpackError::io(parent, e))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StackpackError::io(path, e))
    }
}

impl ArtifactStore for FsStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tracing::debug!(path = %full.display(), "reading blob");
        Self::read(&full).await
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let full = self.resolve(path)?;
        tracing::debug!(path = %full.display(), size = bytes.len(), "writing blob");
        Self::write(&full, &bytes).await?;
        Ok(full.display().to_string())
    }
}

impl BuildRecords for FsStore {
    async fn load_target(&self, id: &TargetId) -> Result<Target> {
        let path = self.resolve(&format!("targets/{}.json", id.as_str()))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StackpackError::NotFound {
                    kind: "target",
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(StackpackError::io(&path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn load_configuration(&self, name: &str) -> Result<Option<Configuration>> {
        let path = self.resolve(&format!("configurations/{name}.json"))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StackpackError::io(&path, e)),
        }
    }

    async fn record_status(&self, build_id: &BuildId, status: BuildStatus) -> Result<()> {
        let path = self.build_path(build_id, "log");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StackpackError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StackpackError::io(&path, e))?;
        file.write_all(format!("{status}\n").as_bytes())
            .await
            .map_err(|e| StackpackError::io(&path, e))
    }

    async fn record_outcome(&self, outcome: &BuildOutcome) -> Result<()> {
        let path = self.build_path(&outcome.build_id, "json");
        let mut bytes = serde_json::to_vec_pretty(outcome)?;
        bytes.push(b'\n');
        Self::write(&path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::stage::Stage;

    fn target() -> Target {
        serde_json::from_value(json!({
            "id": "t1",
            "name": "shop",
            "members": [{"name": "api", "compose": "services: {}"}]
        }))
        .expect("target")
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        store.insert_target(target());
        store.insert_blob("a/b.txt", "hi");

        assert_eq!(store.load_target(&TargetId::new("t1")).await.expect("target").name, "shop");
        assert!(store.load_target(&TargetId::new("nope")).await.is_err());
        assert!(store.load_configuration("missing").await.expect("load").is_none());
        assert_eq!(store.download("a/b.txt").await.expect("blob"), b"hi");
        assert_eq!(store.upload("out/x", b"z".to_vec()).await.expect("upload"), "memory://out/x");
        assert_eq!(store.blob("out/x"), Some(b"z".to_vec()));
    }

    #[tokio::test]
    async fn fs_store_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("targets")).expect("mkdir");
        std::fs::write(
            dir.path().join("targets/t1.json"),
            serde_json::to_vec(&target()).expect("json"),
        )
        .expect("write target");

        assert_eq!(store.load_target(&TargetId::new("t1")).await.expect("target"), target());
        assert!(matches!(
            store.load_target(&TargetId::new("t2")).await,
            Err(StackpackError::NotFound { .. })
        ));
        assert!(store.load_configuration("none").await.expect("load").is_none());

        let locator = store.upload("packages/b.tar.gz", b"bytes".to_vec()).await.expect("upload");
        assert!(locator.ends_with("packages/b.tar.gz"));
        assert_eq!(store.download("packages/b.tar.gz").await.expect("download"), b"bytes");

        let id = BuildId::new("b1");
        store.record_status(&id, BuildStatus::Pending).await.expect("status");
        store
            .record_status(&id, BuildStatus::Building(Stage::Validation))
            .await
            .expect("status");
        let log = std::fs::read_to_string(dir.path().join("builds/b1.log")).expect("log");
        assert_eq!(log, "pending\nbuilding:validation\n");
    }

    #[tokio::test]
    async fn fs_store_refuses_escaping_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::new(dir.path());
        assert!(store.download("../secret").await.is_err());
        assert!(store.upload("/etc/x", Vec::new()).await.is_err());
    }
}
