use detect_storage::{InitError, StoreError};

use crate::compiler::CompileError;
use crate::persister::PersistError;
use crate::sigma::SigmaErrors;

/// Failure outcome of an indexing or delete operation.
#[derive(Debug, thiserror::Error)]
pub enum IndexRuleError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error("rule for category '{category}' could not be parsed: {reason}")]
    Parse { category: String, reason: String },

    /// Semantic errors from the parser, unchanged.
    #[error(transparent)]
    Validation(SigmaErrors),

    #[error("rule for category '{category}' failed to compile: {source}")]
    Compile {
        category: String,
        #[source]
        source: CompileError,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("indexing pipeline ended without a result")]
    Cancelled,
}

impl IndexRuleError {
    pub fn from_compile(category: &str, error: CompileError) -> Self {
        match error {
            CompileError::Parse(e) => IndexRuleError::Parse {
                category: category.to_string(),
                reason: e.to_string(),
            },
            CompileError::Validation(errors) => IndexRuleError::Validation(errors),
            other => IndexRuleError::Compile {
                category: category.to_string(),
                source: other,
            },
        }
    }
}
