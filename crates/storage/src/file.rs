use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{DocumentStore, Fetched, StoreError, StoreResult, VersionToken};

/// File system document store.
///
/// Version tokens are hex SHA-256 digests of the document bytes, so a token
/// stays valid exactly as long as the bytes on disk are unchanged, and
/// identical content keeps its token across rewrites. Conditional writes are
/// serialized through a process-wide lock; writers in other processes are
/// not guarded against.
pub struct FileDocumentStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    /// Create a store rooted at the given directory
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        FileDocumentStore {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    fn content_token(content: &[u8]) -> VersionToken {
        VersionToken::new(hex::encode(Sha256::digest(content)))
    }

    async fn read_current(&self, full_path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(format!("failed to read document: {}", err))),
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Fetched>> {
        let full_path = self.full_path(path);
        match self.read_current(&full_path).await? {
            Some(content) => Ok(Some(Fetched {
                version: Self::content_token(&content),
                content,
            })),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StoreResult<()> {
        // The compare and the write happen under one lock so the version
        // check stays atomic within this process.
        let _guard = self.write_lock.lock().await;
        let full_path = self.full_path(path);

        match (self.read_current(&full_path).await?, expected) {
            (Some(current), Some(token)) if Self::content_token(&current) == *token => {}
            (None, None) => {}
            (Some(_), _) => {
                debug!("version conflict on {}", path);
                return Err(StoreError::Conflict(path.to_string()));
            }
            (None, Some(_)) => return Err(StoreError::NotFound(path.to_string())),
        }

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("failed to create directory: {}", e)))?;
        }

        tokio::fs::write(&full_path, content)
            .await
            .map_err(|e| StoreError::Io(format!("failed to write document: {}", e)))
    }
}
