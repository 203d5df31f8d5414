use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{DocumentStore, Fetched, StoreError, StoreResult, VersionToken};

/// Generate a fresh version token
fn next_version() -> VersionToken {
    use rand::{thread_rng, Rng};
    let mut rng = thread_rng();
    let rand_part: u64 = rng.gen();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    VersionToken::new(format!("v-{}-{:x}", timestamp, rand_part))
}

/// In-memory document store.
///
/// Every write rotates the version token, so a writer holding a stale
/// token always conflicts.
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, (Vec<u8>, VersionToken)>>,
}

impl MemoryDocumentStore {
    /// Create a new memory store instance
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Fetched>> {
        let documents = self.documents.read().await;
        Ok(documents.get(path).map(|(content, version)| Fetched {
            content: content.clone(),
            version: version.clone(),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        match (documents.get(path), expected) {
            (Some((_, current)), Some(token)) if current == token => {}
            (Some(_), Some(_)) => return Err(StoreError::Conflict(path.to_string())),
            (Some(_), None) => return Err(StoreError::Conflict(path.to_string())),
            (None, Some(_)) => return Err(StoreError::NotFound(path.to_string())),
            (None, None) => {}
        }
        documents.insert(path.to_string(), (content.to_vec(), next_version()));
        Ok(())
    }
}
