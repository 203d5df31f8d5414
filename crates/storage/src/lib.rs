//! Versioned document storage for Tally
//!
//! This crate provides the document layer under the vote ledger:
//! - A `DocumentStore` trait with version-tagged reads and conditional
//!   single-document writes
//! - A JSON extension trait for typed documents
//! - A memory implementation for tests and embedding
//! - A file system implementation with content-derived version tokens

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod file;
pub mod memory;

// Re-export commonly used types
pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

/// Storage-related errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            StoreError::Deserialization(err.to_string())
        } else {
            StoreError::Serialization(err.to_string())
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque version token attached to every stored document.
///
/// Tokens are compared for equality only; callers must not parse them.
/// Each store implementation chooses its own scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(value: impl Into<String>) -> Self {
        VersionToken(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document together with the version token it was read at
#[derive(Debug, Clone)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub version: VersionToken,
}

/// The core trait all document stores implement.
///
/// Stores offer no transactions and no multi-document operations. A
/// consistent update is a read followed by a conditional write, and a
/// `Conflict` means another writer got in between.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Read a document and its current version token. `Ok(None)` means the
    /// document does not exist, which is a normal state rather than an error.
    async fn get(&self, path: &str) -> StoreResult<Option<Fetched>>;

    /// Conditionally write a document.
    ///
    /// With `Some(token)` the write succeeds only while the stored version
    /// still equals the token; a mismatch is a `Conflict` and a document
    /// that has disappeared is `NotFound`. With `None` the write creates
    /// the document and conflicts if one already exists.
    async fn put(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StoreResult<()>;
}

/// Extension trait for JSON serialization/deserialization
#[async_trait]
pub trait JsonDocumentStore: DocumentStore {
    /// Store a serializable value under the same conditional-write rules
    /// as [`DocumentStore::put`]
    async fn put_json<T: Serialize + Send + Sync>(
        &self,
        path: &str,
        value: &T,
        expected: Option<&VersionToken>,
    ) -> StoreResult<()> {
        let json_data = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(path, &json_data, expected).await
    }

    /// Read and deserialize a document along with its version token
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        path: &str,
    ) -> StoreResult<Option<(T, VersionToken)>> {
        match self.get(path).await? {
            Some(fetched) => {
                let value = serde_json::from_slice(&fetched.content)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some((value, fetched.version)))
            }
            None => Ok(None),
        }
    }
}

// Implement JsonDocumentStore for any type that implements DocumentStore
impl<T: DocumentStore + ?Sized> JsonDocumentStore for T {}
