//! Detection rule compilation and indexing.
//!
//! This crate provides:
//! - A Sigma-style YAML rule parser that collects every validation error
//! - An OpenSearch `query_string` backend behind the [`compiler::RuleCompiler`] seam
//! - Field discovery and raw → schema field mapping with identity fallback
//! - [`indexer::RuleIndexer`], which initializes the store, compiles in two
//!   passes, writes the rule and then best-effort writes its field mappings

pub mod backend;
pub mod compiler;
pub mod gate;
pub mod index_schema;
pub mod indexer;
pub mod mappings;
pub mod persister;
pub mod rule;
pub mod sigma;

pub use compiler::{CompileError, CompiledArtifact, RuleCompiler, SigmaCompiler};
pub use indexer::{
    DeleteRuleRequest, DeleteRuleResponse, IndexRuleError, IndexRuleResponse, RuleIndexer,
    RuleRequest,
};
pub use rule::CompiledRule;
