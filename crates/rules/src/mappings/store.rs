use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use detect_core::RefreshPolicy;
use detect_storage::{DocumentStore, IndexInitializer, InitError, StoreError, WriteCondition};

use super::FieldMapping;
use crate::index_schema;

#[derive(Debug, thiserror::Error)]
pub enum MappingStoreError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error("field mapping store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to serialize field mapping: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("field mapping '{raw_field}' still contended after {attempts} attempts")]
    Contended { raw_field: String, attempts: usize },
}

/// Read-merge-write attempts per field before giving up on a contended document.
const MAX_MERGE_ATTEMPTS: usize = 16;

/// Where field-mapping documents are written.
#[async_trait]
pub trait FieldMappingStore: Send + Sync {
    /// Schema identifier new mappings are recorded under.
    fn default_schema(&self) -> &str;

    async fn write_field_mappings(&self, mappings: Vec<FieldMapping>) -> Result<(), MappingStoreError>;
}

/// [`FieldMappingStore`] keeping one document per raw field in an index.
pub struct IndexFieldMappingStore {
    store: Arc<dyn DocumentStore>,
    initializer: IndexInitializer,
    default_schema: String,
    write_timeout: Duration,
}

impl IndexFieldMappingStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: impl Into<String>,
        default_schema: impl Into<String>,
    ) -> Self {
        let initializer =
            IndexInitializer::new(Arc::clone(&store), index, index_schema::field_mappings_index());
        Self {
            store,
            initializer,
            default_schema: default_schema.into(),
            write_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Fold `mapping` into the stored document for its raw field.
    ///
    /// The write only lands if nobody changed the document since it was read;
    /// on conflict the document is read and merged again.
    async fn merge_into_store(&self, mapping: FieldMapping) -> Result<(), MappingStoreError> {
        let index = self.initializer.index();
        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let existing = self.store.get_document(index, &mapping.raw_field).await?;
            let condition = WriteCondition::expecting(existing.as_ref());

            let merged = match existing {
                None => mapping.clone(),
                Some(doc) => match serde_json::from_value::<FieldMapping>(doc.source) {
                    Ok(mut previous) => {
                        previous.merge(mapping.clone());
                        previous
                    }
                    Err(e) => {
                        warn!(index, raw_field = %mapping.raw_field, error = %e, "replacing unreadable field mapping");
                        mapping.clone()
                    }
                },
            };
            let body = serde_json::to_value(&merged)?;

            match self
                .store
                .write_document_if(
                    index,
                    &merged.raw_field,
                    &body,
                    condition,
                    self.write_timeout,
                    RefreshPolicy::None,
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(index, raw_field = %mapping.raw_field, attempt, "field mapping changed concurrently, retrying merge");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MappingStoreError::Contended {
            raw_field: mapping.raw_field,
            attempts: MAX_MERGE_ATTEMPTS,
        })
    }
}

#[async_trait]
impl FieldMappingStore for IndexFieldMappingStore {
    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    async fn write_field_mappings(&self, mappings: Vec<FieldMapping>) -> Result<(), MappingStoreError> {
        if mappings.is_empty() {
            return Ok(());
        }
        self.initializer.ensure_ready().await?;

        let index = self.initializer.index();
        let count = mappings.len();
        for mapping in mappings {
            self.merge_into_store(mapping).await?;
        }
        debug!(index, count, "field mappings written");
        Ok(())
    }
}
