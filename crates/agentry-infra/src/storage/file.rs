//! Local filesystem file memory.
//!
//! Implements `FileMemory` from `agentry-core` with files stored at
//! `{root}/{scope}/{path}`. Writes go to a temporary sibling first and are
//! renamed into place, so readers never observe a half-written file.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use agentry_core::memory::FileMemory;
use agentry_types::error::RepositoryError;
use uuid::Uuid;

/// Directory name under the data directory used when no root is configured.
pub const DEFAULT_FILE_DIR: &str = "files";

/// Filesystem-backed implementation of `FileMemory`.
pub struct LocalFileMemory {
    root: PathBuf,
    started: AtomicBool,
}

impl LocalFileMemory {
    /// Create a file memory rooted at `root`. Nothing touches the disk until
    /// `start`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            started: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_started(&self) -> Result<(), RepositoryError> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RepositoryError::NotStarted)
        }
    }

    /// Resolve `(scope, path)` to a location under the root.
    fn resolve(&self, scope: &str, path: &str) -> Result<PathBuf, RepositoryError> {
        let scope = relative(scope)?;
        let path = relative(path)?;
        if path.as_os_str().is_empty() {
            return Err(RepositoryError::InvalidPath("empty file path".to_string()));
        }
        Ok(self.root.join(scope).join(path))
    }
}

/// Normalize a caller-supplied relative path, rejecting anything that could
/// leave its parent directory.
fn relative(raw: &str) -> Result<PathBuf, RepositoryError> {
    let mut clean = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RepositoryError::InvalidPath(raw.to_string()));
            }
        }
    }
    Ok(clean)
}

fn io_error(path: &Path, e: std::io::Error) -> RepositoryError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RepositoryError::NotFound
    } else {
        RepositoryError::Query(format!("{}: {e}", path.display()))
    }
}

impl FileMemory for LocalFileMemory {
    async fn start(&self) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::info!(root = %self.root.display(), "local file memory started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), RepositoryError> {
        if self.started.swap(false, Ordering::AcqRel) {
            tracing::info!(root = %self.root.display(), "local file memory stopped");
        }
        Ok(())
    }

    async fn read_file(&self, scope: &str, path: &str) -> Result<Vec<u8>, RepositoryError> {
        self.ensure_started()?;
        let full = self.resolve(scope, path)?;
        tokio::fs::read(&full).await.map_err(|e| io_error(&full, e))
    }

    async fn write_file(&self, scope: &str, path: &str, contents: &[u8]) -> Result<(), RepositoryError> {
        self.ensure_started()?;
        let full = self.resolve(scope, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let file_name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = full.with_file_name(format!(".{file_name}.{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&staging, contents)
            .await
            .map_err(|e| io_error(&staging, e))?;
        if let Err(e) = tokio::fs::rename(&staging, &full).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_error(&full, e));
        }

        tracing::debug!(scope, path, bytes = contents.len(), "wrote file");
        Ok(())
    }
}
