//! Writes compiled rules and their field mappings.
//!
//! The rule write is the primary outcome and is bounded by a timeout. The
//! mapping write is secondary: callers log its failure and move on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use detect_core::{RefreshPolicy, WriteAck};
use detect_storage::{DocumentStore, StoreError};

use crate::mappings::{FieldMapping, FieldMappingStore, MappingStoreError};
use crate::rule::CompiledRule;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("rule write timed out after {0:?}")]
    Timeout(Duration),

    #[error("rule write failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to serialize rule document: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct RulePersister {
    store: Arc<dyn DocumentStore>,
    mapping_store: Arc<dyn FieldMappingStore>,
    rules_index: String,
    write_timeout: Duration,
}

impl RulePersister {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        mapping_store: Arc<dyn FieldMappingStore>,
        rules_index: impl Into<String>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            mapping_store,
            rules_index: rules_index.into(),
            write_timeout,
        }
    }

    pub fn default_schema(&self) -> &str {
        self.mapping_store.default_schema()
    }

    pub async fn persist_rule(
        &self,
        rule: &CompiledRule,
        refresh: RefreshPolicy,
    ) -> Result<WriteAck, PersistError> {
        let body = rule.to_document();
        let write = self.store.write_document(
            &self.rules_index,
            &rule.id,
            &body,
            self.write_timeout,
            refresh,
        );

        let ack = tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| PersistError::Timeout(self.write_timeout))??;

        info!(
            rule_id = %ack.id,
            version = ack.version,
            status = %ack.status,
            category = %rule.category,
            "rule persisted"
        );
        Ok(ack)
    }

    pub async fn persist_field_mappings(
        &self,
        mappings: Vec<FieldMapping>,
    ) -> Result<(), MappingStoreError> {
        let count = mappings.len();
        self.mapping_store.write_field_mappings(mappings).await?;
        debug!(count, "field mappings persisted");
        Ok(())
    }

    /// Remove a rule document; `None` when it did not exist.
    pub async fn delete_rule(
        &self,
        rule_id: &str,
        refresh: RefreshPolicy,
    ) -> Result<Option<WriteAck>, PersistError> {
        let ack = self
            .store
            .delete_document(&self.rules_index, rule_id, refresh)
            .await?;
        if let Some(ack) = &ack {
            info!(rule_id, version = ack.version, "rule deleted");
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use detect_storage::{CreateIndexAck, MemoryStore, StoredDocument, WriteCondition};

    use super::*;
    use crate::mappings::IndexFieldMappingStore;
    use crate::sigma::SigmaRule;

    fn compiled() -> CompiledRule {
        let text = "title: t\ndetection:\n  sel:\n    a: 1\n  condition: sel\n";
        let parsed = SigmaRule::parse(text).unwrap();
        CompiledRule {
            id: parsed.id.to_string(),
            version: None,
            parsed,
            category: "test".into(),
            queries: vec![json!({"query": "a:1"})],
            query_field_names: vec!["a".into()],
            rule_text: text.into(),
        }
    }

    /// Store whose writes never complete.
    struct HangingStore;

    #[async_trait]
    impl DocumentStore for HangingStore {
        async fn index_exists(&self, _index: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn create_index(
            &self,
            _index: &str,
            _schema: &serde_json::Value,
        ) -> Result<CreateIndexAck, StoreError> {
            Ok(CreateIndexAck { acknowledged: true })
        }

        async fn write_document(
            &self,
            _index: &str,
            _id: &str,
            _body: &serde_json::Value,
            _timeout: Duration,
            _refresh: RefreshPolicy,
        ) -> Result<WriteAck, StoreError> {
            std::future::pending().await
        }

        async fn write_document_if(
            &self,
            _index: &str,
            _id: &str,
            _body: &serde_json::Value,
            _condition: WriteCondition,
            _timeout: Duration,
            _refresh: RefreshPolicy,
        ) -> Result<WriteAck, StoreError> {
            std::future::pending().await
        }

        async fn get_document(
            &self,
            _index: &str,
            _id: &str,
        ) -> Result<Option<StoredDocument>, StoreError> {
            Ok(None)
        }

        async fn delete_document(
            &self,
            _index: &str,
            _id: &str,
            _refresh: RefreshPolicy,
        ) -> Result<Option<WriteAck>, StoreError> {
            Ok(None)
        }
    }

    fn persister(store: Arc<dyn DocumentStore>, timeout: Duration) -> RulePersister {
        let mappings = Arc::new(IndexFieldMappingStore::new(Arc::clone(&store), "mappings", "ecs"));
        RulePersister::new(store, mappings, "rules", timeout)
    }

    #[tokio::test]
    async fn persists_rule_document() {
        let store = Arc::new(MemoryStore::new());
        store.create_index("rules", &json!({})).await.unwrap();
        let persister = persister(store.clone(), Duration::from_secs(10));

        let rule = compiled();
        let ack = persister.persist_rule(&rule, RefreshPolicy::Immediate).await.unwrap();
        assert_eq!(ack.id, rule.id);
        assert_eq!(ack.version, 1);
        let doc = store.document("rules", &rule.id).unwrap();
        assert_eq!(doc.source["rule"]["category"], "test");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out() {
        let persister = persister(Arc::new(HangingStore), Duration::from_secs(10));
        let err = persister
            .persist_rule(&compiled(), RefreshPolicy::None)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn delete_reports_missing_rule() {
        let store = Arc::new(MemoryStore::new());
        store.create_index("rules", &json!({})).await.unwrap();
        let persister = persister(store, Duration::from_secs(10));
        let ack = persister.delete_rule("ghost", RefreshPolicy::None).await.unwrap();
        assert!(ack.is_none());
    }
}
