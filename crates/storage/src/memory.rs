//! In-process [`DocumentStore`] used by tests and dry runs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use detect_core::{RefreshPolicy, WriteAck, WriteStatus};

use crate::{CreateIndexAck, DocumentStore, StoreError, StoredDocument, WriteCondition};

/// Single-node store, so the primary term never changes.
const PRIMARY_TERM: i64 = 1;

struct MemoryIndex {
    schema: serde_json::Value,
    documents: HashMap<String, StoredDocument>,
    next_seq_no: i64,
}

impl MemoryIndex {
    fn put(&mut self, id: &str, body: &serde_json::Value) -> WriteAck {
        let (version, status) = match self.documents.get(id) {
            Some(existing) => (existing.version + 1, WriteStatus::Updated),
            None => (1, WriteStatus::Created),
        };
        let seq_no = self.next_seq_no;
        self.next_seq_no += 1;
        self.documents.insert(
            id.to_string(),
            StoredDocument {
                id: id.to_string(),
                version,
                seq_no,
                primary_term: PRIMARY_TERM,
                source: body.clone(),
            },
        );
        WriteAck {
            id: id.to_string(),
            version,
            status,
        }
    }

    fn holds(&self, id: &str, condition: WriteCondition) -> bool {
        match (condition, self.documents.get(id)) {
            (WriteCondition::Absent, current) => current.is_none(),
            (WriteCondition::Unchanged { seq_no, primary_term }, Some(doc)) => {
                doc.seq_no == seq_no && doc.primary_term == primary_term
            }
            (WriteCondition::Unchanged { .. }, None) => false,
        }
    }
}

/// Thread-safe in-memory document store.
///
/// Mirrors the store semantics the pipeline relies on: creating an existing
/// index fails, writing to a missing index fails, versions start at 1 and
/// increase on every overwrite.
#[derive(Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all existing indices, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let guard = self.indices.read().expect("indices lock poisoned");
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schema body the index was created with.
    pub fn schema(&self, index: &str) -> Option<serde_json::Value> {
        let guard = self.indices.read().expect("indices lock poisoned");
        guard.get(index).map(|i| i.schema.clone())
    }

    /// Synchronous document lookup for assertions.
    pub fn document(&self, index: &str, id: &str) -> Option<StoredDocument> {
        let guard = self.indices.read().expect("indices lock poisoned");
        guard.get(index).and_then(|i| i.documents.get(id).cloned())
    }

    pub fn document_count(&self, index: &str) -> usize {
        let guard = self.indices.read().expect("indices lock poisoned");
        guard.get(index).map(|i| i.documents.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self
            .indices
            .read()
            .expect("indices lock poisoned")
            .contains_key(index))
    }

    async fn create_index(
        &self,
        index: &str,
        schema: &serde_json::Value,
    ) -> Result<CreateIndexAck, StoreError> {
        let mut guard = self.indices.write().expect("indices lock poisoned");
        if guard.contains_key(index) {
            return Err(StoreError::IndexAlreadyExists(index.to_string()));
        }
        guard.insert(
            index.to_string(),
            MemoryIndex {
                schema: schema.clone(),
                documents: HashMap::new(),
                next_seq_no: 0,
            },
        );
        debug!(index, "created in-memory index");
        Ok(CreateIndexAck { acknowledged: true })
    }

    async fn write_document(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        _timeout: Duration,
        _refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError> {
        let mut guard = self.indices.write().expect("indices lock poisoned");
        let idx = guard
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        Ok(idx.put(id, body))
    }

    async fn write_document_if(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        condition: WriteCondition,
        _timeout: Duration,
        _refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError> {
        let mut guard = self.indices.write().expect("indices lock poisoned");
        let idx = guard
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        if !idx.holds(id, condition) {
            debug!(index, id, ?condition, "conditional write lost the race");
            return Err(StoreError::VersionConflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        Ok(idx.put(id, body))
    }

    async fn get_document(
        &self,
        index: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let guard = self.indices.read().expect("indices lock poisoned");
        let idx = guard
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        Ok(idx.documents.get(id).cloned())
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        _refresh: RefreshPolicy,
    ) -> Result<Option<WriteAck>, StoreError> {
        let mut guard = self.indices.write().expect("indices lock poisoned");
        let idx = guard
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        Ok(idx.documents.remove(id).map(|doc| WriteAck {
            id: doc.id,
            version: doc.version + 1,
            status: WriteStatus::Deleted,
        }))
    }
}
