//! Semantic validation errors collected while parsing a rule.

use std::fmt;

/// A single semantic problem found in a structurally valid rule document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SigmaError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid rule id '{0}': expected a UUID")]
    InvalidId(String),

    #[error("invalid level '{0}': expected one of informational, low, medium, high, critical")]
    InvalidLevel(String),

    #[error("unknown modifier '{modifier}' on '{field}'")]
    UnknownModifier { field: String, modifier: String },

    #[error("invalid modifiers on '{field}': {reason}")]
    InvalidModifier { field: String, reason: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("search identifier '{0}' is empty")]
    EmptyIdentifier(String),

    #[error("condition references undefined search identifier '{0}'")]
    UndefinedIdentifier(String),

    #[error("malformed condition '{condition}': {reason}")]
    Condition { condition: String, reason: String },
}

/// All validation errors for one rule, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigmaErrors(Vec<SigmaError>);

impl SigmaErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SigmaError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SigmaError> {
        self.0.iter()
    }

    pub fn errors(&self) -> &[SigmaError] {
        &self.0
    }
}

impl fmt::Display for SigmaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SigmaErrors {}

impl From<Vec<SigmaError>> for SigmaErrors {
    fn from(errors: Vec<SigmaError>) -> Self {
        Self(errors)
    }
}

/// The rule text could not be read as a rule document at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty rule")]
    Empty,

    #[error("invalid YAML: {0}")]
    Yaml(String),

    #[error("rule must be a YAML mapping")]
    NotMapping,
}
