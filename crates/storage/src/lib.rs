//! Document store contract and backends for compiled rule storage.
//!
//! The rules crate only talks to [`DocumentStore`]; the CLI injects an
//! [`OpenSearchStore`] at startup and tests use [`MemoryStore`].

pub mod error;
pub mod initializer;
pub mod memory;
pub mod opensearch;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use detect_core::{RefreshPolicy, WriteAck};

pub use error::StoreError;
pub use initializer::{IndexInitializer, InitError};
pub use memory::MemoryStore;
pub use opensearch::OpenSearchStore;

/// Response to an index creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexAck {
    pub acknowledged: bool,
}

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub version: i64,
    /// Sequence number and primary term of the last write; together they
    /// identify this exact revision for [`WriteCondition::Unchanged`].
    #[serde(default)]
    pub seq_no: i64,
    #[serde(default)]
    pub primary_term: i64,
    pub source: serde_json::Value,
}

/// Precondition for [`DocumentStore::write_document_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// The document must not exist yet.
    Absent,
    /// The document must still be at the revision that was read.
    Unchanged { seq_no: i64, primary_term: i64 },
}

impl WriteCondition {
    /// Condition that holds only while `current` is still the latest revision.
    pub fn expecting(current: Option<&StoredDocument>) -> Self {
        match current {
            None => WriteCondition::Absent,
            Some(doc) => WriteCondition::Unchanged {
                seq_no: doc.seq_no,
                primary_term: doc.primary_term,
            },
        }
    }
}

/// Minimal index/document API the indexing pipeline depends on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether `index` currently exists.
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create `index` with the given mappings/settings body.
    ///
    /// Fails with [`StoreError::IndexAlreadyExists`] if another caller got there first.
    async fn create_index(
        &self,
        index: &str,
        schema: &serde_json::Value,
    ) -> Result<CreateIndexAck, StoreError>;

    /// Create or replace the document `id` in `index`.
    async fn write_document(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        timeout: Duration,
        refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError>;

    /// Create or replace the document `id` only if `condition` still holds.
    ///
    /// Fails with [`StoreError::VersionConflict`] when another writer got
    /// there first.
    async fn write_document_if(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        condition: WriteCondition,
        timeout: Duration,
        refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError>;

    /// Fetch a document by id. `Ok(None)` when it does not exist.
    async fn get_document(&self, index: &str, id: &str)
        -> Result<Option<StoredDocument>, StoreError>;

    /// Delete a document by id. `Ok(None)` when there was nothing to delete.
    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        refresh: RefreshPolicy,
    ) -> Result<Option<WriteAck>, StoreError>;
}
