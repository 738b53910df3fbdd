//! Rule indexing orchestrator.
//!
//! One run moves through [`PipelineState`]:
//!
//! ```text
//! Initializing -> Discovering -> Compiling -> Persisting -> MappingUpdate -> Done
//! ```
//!
//! Any failure before `MappingUpdate` ends the run with that error. The
//! mapping update itself never changes the outcome.

mod error;
mod request;
mod state;

pub use error::IndexRuleError;
pub use request::{DeleteRuleRequest, DeleteRuleResponse, IndexRuleResponse, RuleRequest};
pub use state::PipelineState;

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, error, info, warn};

use detect_core::config::IndexingConfig;
use detect_storage::{DocumentStore, IndexInitializer, StoreError};

use crate::compiler::{RuleCompiler, SigmaCompiler};
use crate::gate::{CompletionGate, CompletionReceiver};
use crate::index_schema;
use crate::mappings::{
    build_field_mappings, FieldMappingResolver, FieldMappingStore, FieldMappingTable,
    IdentityMappingResolver, IndexFieldMappingStore,
};
use crate::persister::{PersistError, RulePersister};
use crate::rule::CompiledRule;

type IndexGate = CompletionGate<IndexRuleResponse, IndexRuleError>;

/// Compiles rules and writes them, plus their field mappings, to the store.
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct RuleIndexer {
    inner: Arc<Inner>,
}

struct Inner {
    initializer: IndexInitializer,
    compiler: Arc<dyn RuleCompiler>,
    resolver: Arc<dyn FieldMappingResolver>,
    persister: RulePersister,
}

/// Builder for [`RuleIndexer`]; every collaborator except the store has a default.
pub struct RuleIndexerBuilder {
    store: Arc<dyn DocumentStore>,
    config: IndexingConfig,
    compiler: Option<Arc<dyn RuleCompiler>>,
    resolver: Option<Arc<dyn FieldMappingResolver>>,
    mapping_store: Option<Arc<dyn FieldMappingStore>>,
}

impl RuleIndexerBuilder {
    pub fn compiler(mut self, compiler: Arc<dyn RuleCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn FieldMappingResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn mapping_store(mut self, mapping_store: Arc<dyn FieldMappingStore>) -> Self {
        self.mapping_store = Some(mapping_store);
        self
    }

    pub fn build(self) -> RuleIndexer {
        let config = self.config;
        let mapping_store = self.mapping_store.unwrap_or_else(|| {
            Arc::new(
                IndexFieldMappingStore::new(
                    Arc::clone(&self.store),
                    config.field_mappings_index.clone(),
                    config.default_schema.clone(),
                )
                .with_write_timeout(config.write_timeout()),
            )
        });

        let initializer = IndexInitializer::new(
            Arc::clone(&self.store),
            config.rules_index.clone(),
            index_schema::rules_index(),
        );
        let persister = RulePersister::new(
            self.store,
            mapping_store,
            config.rules_index.clone(),
            config.write_timeout(),
        );

        RuleIndexer {
            inner: Arc::new(Inner {
                initializer,
                compiler: self.compiler.unwrap_or_else(|| Arc::new(SigmaCompiler)),
                resolver: self
                    .resolver
                    .unwrap_or_else(|| Arc::new(IdentityMappingResolver)),
                persister,
            }),
        }
    }
}

impl RuleIndexer {
    pub fn builder(store: Arc<dyn DocumentStore>, config: IndexingConfig) -> RuleIndexerBuilder {
        RuleIndexerBuilder {
            store,
            config,
            compiler: None,
            resolver: None,
            mapping_store: None,
        }
    }

    /// Indexer with the default compiler, identity resolver and index-backed
    /// mapping store.
    pub fn new(store: Arc<dyn DocumentStore>, config: IndexingConfig) -> Self {
        Self::builder(store, config).build()
    }

    /// Start indexing `request` on the runtime and return its completion
    /// receiver immediately. Dropping the receiver does not stop the run.
    pub fn submit(&self, request: RuleRequest) -> CompletionReceiver<IndexRuleResponse, IndexRuleError> {
        let (gate, rx) = CompletionGate::new();
        let indexer = self.clone();

        tokio::spawn(async move {
            match indexer.execute(&request, &gate).await {
                Ok(response) => {
                    gate.succeed(response);
                }
                Err(e) => {
                    warn!(category = %request.category(), error = %e, "rule indexing failed");
                    gate.fail(e);
                }
            }
        });

        rx
    }

    /// Submit and wait for the outcome.
    pub async fn index_rule(&self, request: RuleRequest) -> Result<IndexRuleResponse, IndexRuleError> {
        self.submit(request)
            .await
            .unwrap_or(Err(IndexRuleError::Cancelled))
    }

    /// Remove a rule document. Its field mappings stay in place.
    pub async fn delete_rule(&self, request: DeleteRuleRequest) -> Result<DeleteRuleResponse, IndexRuleError> {
        request.validate()?;
        debug!(rule_id = %request.rule_id, force = request.force, "deleting rule");

        match self
            .inner
            .persister
            .delete_rule(&request.rule_id, request.refresh)
            .await
        {
            Ok(Some(ack)) => Ok(ack.into()),
            Ok(None) | Err(PersistError::Store(StoreError::IndexNotFound(_))) => {
                Err(IndexRuleError::RuleNotFound(request.rule_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run both compile passes without touching the store.
    pub fn compile_only(&self, rule_text: &str, category: &str) -> Result<CompiledRule, IndexRuleError> {
        let request = RuleRequest::new(rule_text, category);
        request.validate()?;
        let (rule, _) = self.compile(&request)?;
        Ok(rule)
    }

    async fn execute(&self, request: &RuleRequest, gate: &IndexGate) -> Result<IndexRuleResponse, IndexRuleError> {
        request.validate()?;
        let category = request.category();
        debug!(category, force = request.force(), refresh = %request.refresh(), "indexing rule");

        enter(category, PipelineState::Initializing);
        self.inner.initializer.ensure_ready().await?;

        let (rule, table) = self.compile(request)?;

        enter(category, PipelineState::Persisting);
        let ack = self
            .inner
            .persister
            .persist_rule(&rule, request.refresh())
            .await?;

        enter(category, PipelineState::MappingUpdate);
        if gate.is_abandoned() {
            info!(rule_id = %rule.id, "caller went away, skipping field mapping update");
        } else {
            let mappings = build_field_mappings(&rule, &table, self.inner.persister.default_schema());
            if let Err(e) = self.inner.persister.persist_field_mappings(mappings).await {
                error!(rule_id = %rule.id, category, error = %e, "failed to update field mappings");
            }
        }

        enter(category, PipelineState::Done);
        Ok(ack.into())
    }

    /// Discovery pass, resolution, strict pass.
    fn compile(&self, request: &RuleRequest) -> Result<(CompiledRule, FieldMappingTable), IndexRuleError> {
        let category = request.category();
        let compiler = &self.inner.compiler;

        enter(category, PipelineState::Discovering);
        let discovered = match compiler.compile(request.rule_text(), &FieldMappingTable::new(), false) {
            Ok(artifact) => artifact.fields,
            Err(e) if e.is_rule_error() => return Err(IndexRuleError::from_compile(category, e)),
            Err(e) => {
                warn!(category, error = %e, "field discovery failed, continuing without fields");
                IndexSet::new()
            }
        };
        let table = self.inner.resolver.resolve(&discovered);

        enter(category, PipelineState::Compiling);
        let artifact = compiler
            .compile(request.rule_text(), &table, true)
            .map_err(|e| IndexRuleError::from_compile(category, e))?;

        let rule = CompiledRule {
            id: artifact.rule.id.to_string(),
            version: None,
            parsed: artifact.rule,
            category: category.to_string(),
            queries: artifact.queries,
            query_field_names: artifact.fields.into_iter().collect(),
            rule_text: request.rule_text().to_string(),
        };
        Ok((rule, table))
    }
}

fn enter(category: &str, state: PipelineState) {
    debug!(category, state = %state, "pipeline state");
}
