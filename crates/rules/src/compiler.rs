//! The compile seam between rule text and backend queries.
//!
//! A compiler is a pure function of its arguments. The orchestrator calls it
//! twice per rule: once with an empty table to discover consulted fields,
//! then strictly with the resolved table.

use indexmap::IndexSet;
use tracing::debug;

use crate::backend;
use crate::mappings::FieldMappingTable;
use crate::sigma::{ParseError, SigmaErrors, SigmaRule};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("rule could not be parsed: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(SigmaErrors),

    #[error("field '{0}' has no schema mapping")]
    UnmappedField(String),

    #[error("condition '{0}' uses an aggregation the query backend cannot express")]
    UnsupportedCondition(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl CompileError {
    /// Errors that stem from the rule text itself rather than the backend.
    pub fn is_rule_error(&self) -> bool {
        matches!(self, CompileError::Parse(_) | CompileError::Validation(_))
    }
}

/// Result of one compile call.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub rule: SigmaRule,
    /// One JSON query document per condition.
    pub queries: Vec<serde_json::Value>,
    /// Raw field names the queries consulted, in first-use order.
    pub fields: IndexSet<String>,
}

pub trait RuleCompiler: Send + Sync {
    fn compile(
        &self,
        rule_text: &str,
        mappings: &FieldMappingTable,
        strict: bool,
    ) -> Result<CompiledArtifact, CompileError>;
}

/// Default compiler: Sigma parser plus the OpenSearch `query_string` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigmaCompiler;

impl RuleCompiler for SigmaCompiler {
    fn compile(
        &self,
        rule_text: &str,
        mappings: &FieldMappingTable,
        strict: bool,
    ) -> Result<CompiledArtifact, CompileError> {
        let rule = SigmaRule::parse(rule_text)?;
        if !rule.is_valid() {
            return Err(CompileError::Validation(rule.errors.clone()));
        }

        let output = backend::convert_rule(&rule, mappings, strict)?;
        debug!(
            rule_id = %rule.id,
            strict,
            queries = output.queries.len(),
            fields = output.fields.len(),
            "rule compiled"
        );

        Ok(CompiledArtifact {
            rule,
            queries: output.queries,
            fields: output.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sigma::SigmaError;

    const RULE: &str = "title: t\ndetection:\n  sel:\n    user.name: admin\n  condition: sel\n";

    #[test]
    fn discovery_then_strict() {
        let compiler = SigmaCompiler;
        let discovered = compiler.compile(RULE, &FieldMappingTable::new(), false).unwrap();
        assert_eq!(discovered.fields.len(), 1);

        let table: FieldMappingTable = discovered
            .fields
            .iter()
            .map(|f| (f.clone(), f.clone()))
            .collect();
        let strict = compiler.compile(RULE, &table, true).unwrap();
        assert_eq!(strict.queries, discovered.queries);
    }

    #[test]
    fn repeated_calls_do_not_share_field_state() {
        let compiler = SigmaCompiler;
        let other = "title: t\ndetection:\n  sel:\n    src_ip: 1.1.1.1\n  condition: sel\n";
        compiler.compile(other, &FieldMappingTable::new(), false).unwrap();
        let artifact = compiler.compile(RULE, &FieldMappingTable::new(), false).unwrap();
        assert_eq!(artifact.fields.iter().collect::<Vec<_>>(), vec!["user.name"]);
    }

    #[test]
    fn empty_text_is_parse_error() {
        let err = SigmaCompiler.compile("", &FieldMappingTable::new(), false).unwrap_err();
        assert!(matches!(err, CompileError::Parse(ParseError::Empty)));
        assert!(err.is_rule_error());
    }

    #[test]
    fn validation_errors_are_returned_verbatim() {
        let err = SigmaCompiler
            .compile("detection:\n  condition: sel\n", &FieldMappingTable::new(), false)
            .unwrap_err();
        match err {
            CompileError::Validation(errors) => {
                assert_eq!(
                    errors.errors(),
                    &[
                        SigmaError::MissingField("title"),
                        SigmaError::UndefinedIdentifier("sel".into()),
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
