//! Idempotent "ensure index exists" for the rule and field-mapping indices.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{DocumentStore, StoreError};

/// Errors from [`IndexInitializer::ensure_ready`].
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Creation failed and the index still does not exist.
    #[error("failed to create index '{index}': {source}")]
    Create {
        index: String,
        #[source]
        source: StoreError,
    },

    /// The store answered the create call without acknowledging it.
    #[error("creation of index '{0}' was not acknowledged")]
    NotAcknowledged(String),
}

/// Ensures a single index exists with its mandated schema.
///
/// Check, create, then re-check once on failure: a concurrent caller that
/// created the index first turns our failed create into a success.
pub struct IndexInitializer {
    store: Arc<dyn DocumentStore>,
    index: String,
    schema: serde_json::Value,
}

impl IndexInitializer {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            store,
            index: index.into(),
            schema,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub async fn ensure_ready(&self) -> Result<(), InitError> {
        match self.store.index_exists(&self.index).await {
            Ok(true) => {
                debug!(index = %self.index, "index already present");
                return Ok(());
            }
            Ok(false) => {}
            // Creation is attempted anyway; its own outcome decides.
            Err(e) => warn!(index = %self.index, error = %e, "index exists check failed"),
        }

        let failure = match self.store.create_index(&self.index, &self.schema).await {
            Ok(ack) if ack.acknowledged => {
                info!(index = %self.index, "index created with mappings");
                return Ok(());
            }
            Ok(_) => InitError::NotAcknowledged(self.index.clone()),
            Err(source) => InitError::Create {
                index: self.index.clone(),
                source,
            },
        };

        match self.store.index_exists(&self.index).await {
            Ok(true) => {
                debug!(index = %self.index, cause = %failure, "index created concurrently");
                Ok(())
            }
            Ok(false) => Err(failure),
            Err(e) => {
                warn!(index = %self.index, error = %e, "index recheck failed");
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use detect_core::{RefreshPolicy, WriteAck};

    use super::*;
    use crate::{CreateIndexAck, MemoryStore, StoredDocument, WriteCondition};

    /// Wraps a [`MemoryStore`] and counts create calls that succeeded.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        created: AtomicUsize,
        /// When set, `index_exists` lies "false" this many times.
        stale_checks: AtomicUsize,
        /// When set, `create_index` fails without touching `inner`.
        reject_creates: bool,
        unacknowledged: bool,
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
            if self
                .stale_checks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Ok(false);
            }
            self.inner.index_exists(index).await
        }

        async fn create_index(
            &self,
            index: &str,
            schema: &serde_json::Value,
        ) -> Result<CreateIndexAck, StoreError> {
            if self.reject_creates {
                return Err(StoreError::Rejected {
                    status: 403,
                    reason: "no privileges".into(),
                });
            }
            if self.unacknowledged {
                return Ok(CreateIndexAck { acknowledged: false });
            }
            let ack = self.inner.create_index(index, schema).await?;
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(ack)
        }

        async fn write_document(
            &self,
            index: &str,
            id: &str,
            body: &serde_json::Value,
            timeout: Duration,
            refresh: RefreshPolicy,
        ) -> Result<WriteAck, StoreError> {
            self.inner.write_document(index, id, body, timeout, refresh).await
        }

        async fn write_document_if(
            &self,
            index: &str,
            id: &str,
            body: &serde_json::Value,
            condition: WriteCondition,
            timeout: Duration,
            refresh: RefreshPolicy,
        ) -> Result<WriteAck, StoreError> {
            self.inner
                .write_document_if(index, id, body, condition, timeout, refresh)
                .await
        }

        async fn get_document(
            &self,
            index: &str,
            id: &str,
        ) -> Result<Option<StoredDocument>, StoreError> {
            self.inner.get_document(index, id).await
        }

        async fn delete_document(
            &self,
            index: &str,
            id: &str,
            refresh: RefreshPolicy,
        ) -> Result<Option<WriteAck>, StoreError> {
            self.inner.delete_document(index, id, refresh).await
        }
    }

    #[tokio::test]
    async fn existing_index_skips_creation() {
        let store = Arc::new(CountingStore::default());
        store.inner.create_index("rules", &json!({})).await.unwrap();

        let init = IndexInitializer::new(store.clone(), "rules", json!({"mappings": {}}));
        init.ensure_ready().await.unwrap();
        assert_eq!(store.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn creates_missing_index_with_schema() {
        let store = Arc::new(MemoryStore::new());
        let schema = json!({"mappings": {"properties": {"rule": {"type": "object"}}}});
        let init = IndexInitializer::new(store.clone(), "rules", schema.clone());

        init.ensure_ready().await.unwrap();
        assert_eq!(store.schema("rules"), Some(schema));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_create_exactly_once() {
        let store = Arc::new(CountingStore::default());
        let init = Arc::new(IndexInitializer::new(store.clone(), "rules", json!({})));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let init = Arc::clone(&init);
                tokio::spawn(async move { init.ensure_ready().await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.expect("task panicked").expect("ensure_ready failed");
        }
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.index_names(), vec!["rules".to_string()]);
    }

    #[tokio::test]
    async fn lost_race_is_resolved_by_recheck() {
        // Another creator already made the index, but our first check was stale.
        let store = Arc::new(CountingStore {
            stale_checks: AtomicUsize::new(1),
            ..Default::default()
        });
        store.inner.create_index("rules", &json!({})).await.unwrap();

        let init = IndexInitializer::new(store.clone(), "rules", json!({}));
        init.ensure_ready().await.unwrap();
        assert_eq!(store.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolved_create_failure_propagates() {
        let store = Arc::new(CountingStore {
            reject_creates: true,
            ..Default::default()
        });
        let init = IndexInitializer::new(store, "rules", json!({}));

        let err = init.ensure_ready().await.unwrap_err();
        match err {
            InitError::Create { index, source } => {
                assert_eq!(index, "rules");
                assert!(matches!(source, StoreError::Rejected { status: 403, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unacknowledged_create_without_index_fails() {
        let store = Arc::new(CountingStore {
            unacknowledged: true,
            ..Default::default()
        });
        let init = IndexInitializer::new(store, "rules", json!({}));
        assert!(matches!(
            init.ensure_ready().await,
            Err(InitError::NotAcknowledged(_))
        ));
    }
}
