//! Sigma-style detection rule parser.
//!
//! A rule is a YAML mapping with a `title`, optional metadata, a `logsource`
//! and a `detection` block. Parsing never stops at the first semantic problem:
//! every issue is collected in [`SigmaRule::errors`] so callers can report
//! them all at once.

pub mod condition;
pub mod detection;
pub mod error;
pub mod rule;

pub use condition::{Condition, ConditionExpr, IdentifierPattern};
pub use detection::{DetectionItem, Modifier, Piece, SearchIdentifier, SigmaString, SigmaValue};
pub use error::{ParseError, SigmaError, SigmaErrors};
pub use rule::{Detection, Level, LogSource, SigmaRule};

#[cfg(test)]
mod tests;
