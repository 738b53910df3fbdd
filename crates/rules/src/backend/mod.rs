//! OpenSearch `query_string` backend.
//!
//! Every condition of a rule becomes one `{"query": "..."}` document. Field
//! names are translated through the mapping table on the way out, and every
//! raw field name touched is recorded in declaration order.

mod escape;

use indexmap::IndexSet;
use serde_json::json;
use tracing::trace;

use crate::compiler::CompileError;
use crate::mappings::FieldMappingTable;
use crate::sigma::{
    ConditionExpr, Detection, DetectionItem, Modifier, Piece, SearchIdentifier, SigmaRule,
    SigmaValue,
};

/// Queries and consulted fields produced from one rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOutput {
    pub queries: Vec<serde_json::Value>,
    pub fields: IndexSet<String>,
}

/// Convert a validated rule into backend queries.
///
/// With `strict` set, a field absent from `mappings` is an error; otherwise
/// the raw name is used as-is.
pub fn convert_rule(
    rule: &SigmaRule,
    mappings: &FieldMappingTable,
    strict: bool,
) -> Result<BackendOutput, CompileError> {
    let mut converter = Converter {
        detection: &rule.detection,
        mappings,
        strict,
        fields: IndexSet::new(),
    };

    let mut queries = Vec::with_capacity(rule.detection.conditions.len());
    for condition in &rule.detection.conditions {
        if condition.aggregation.is_some() {
            return Err(CompileError::UnsupportedCondition(condition.source.clone()));
        }
        let query = converter.expr(&condition.expr)?;
        trace!(rule_id = %rule.id, condition = %condition.source, query = %query, "converted condition");
        queries.push(json!({ "query": query }));
    }

    Ok(BackendOutput {
        queries,
        fields: converter.fields,
    })
}

struct Converter<'a> {
    detection: &'a Detection,
    mappings: &'a FieldMappingTable,
    strict: bool,
    fields: IndexSet<String>,
}

impl Converter<'_> {
    fn expr(&mut self, expr: &ConditionExpr) -> Result<String, CompileError> {
        match expr {
            ConditionExpr::Identifier(name) => self.identifier(name),
            ConditionExpr::Not(inner) => Ok(format!("NOT {}", self.expr(inner)?)),
            ConditionExpr::And(terms) => {
                let parts = terms.iter().map(|t| self.expr(t)).collect::<Result<Vec<_>, _>>()?;
                Ok(join(parts, "AND"))
            }
            ConditionExpr::Or(terms) => {
                let parts = terms.iter().map(|t| self.expr(t)).collect::<Result<Vec<_>, _>>()?;
                Ok(join(parts, "OR"))
            }
            ConditionExpr::OneOf(pattern) | ConditionExpr::AllOf(pattern) => {
                let detection = self.detection;
                let names = pattern.expand(&detection.identifier_names());
                if names.is_empty() {
                    return Err(CompileError::Backend(format!(
                        "pattern '{pattern}' matches no search identifier"
                    )));
                }
                let parts = names
                    .into_iter()
                    .map(|n| self.identifier(n))
                    .collect::<Result<Vec<_>, _>>()?;
                let op = if matches!(expr, ConditionExpr::AllOf(_)) { "AND" } else { "OR" };
                Ok(join(parts, op))
            }
        }
    }

    fn identifier(&mut self, name: &str) -> Result<String, CompileError> {
        let detection = self.detection;
        let ident = detection
            .identifiers
            .get(name)
            .ok_or_else(|| CompileError::Backend(format!("unknown search identifier '{name}'")))?;

        match ident {
            SearchIdentifier::AllOf(items) => self.items(items),
            SearchIdentifier::AnyOf(groups) => {
                let parts = groups
                    .iter()
                    .map(|g| self.items(g))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(join(parts, "OR"))
            }
            SearchIdentifier::Keywords(values) => {
                Ok(join(values.iter().map(keyword).collect(), "OR"))
            }
        }
    }

    fn items(&mut self, items: &[DetectionItem]) -> Result<String, CompileError> {
        let parts = items
            .iter()
            .map(|i| self.item(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(join(parts, "AND"))
    }

    fn item(&mut self, item: &DetectionItem) -> Result<String, CompileError> {
        let field = escape::escape_term(&self.map_field(&item.field)?);
        let parts: Vec<String> = item.values.iter().map(|v| render(&field, item, v)).collect();
        let op = if item.has(Modifier::All) { "AND" } else { "OR" };
        Ok(join(parts, op))
    }

    fn map_field(&mut self, raw: &str) -> Result<String, CompileError> {
        self.fields.insert(raw.to_string());
        match self.mappings.get(raw) {
            Some(mapped) => Ok(mapped.clone()),
            None if self.strict => Err(CompileError::UnmappedField(raw.to_string())),
            None => Ok(raw.to_string()),
        }
    }
}

fn join(mut parts: Vec<String>, op: &str) -> String {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    format!("({})", parts.join(&format!(" {op} ")))
}

/// `field:value` for one value under the item's modifiers.
fn render(field: &str, item: &DetectionItem, value: &SigmaValue) -> String {
    if item.has(Modifier::Exists) {
        return match value {
            SigmaValue::Bool(false) => format!("NOT _exists_:{field}"),
            _ => format!("_exists_:{field}"),
        };
    }

    let s = match value {
        SigmaValue::Null => return format!("NOT _exists_:{field}"),
        SigmaValue::Int(n) => return format!("{field}:{}", numeric(item, &n.to_string())),
        SigmaValue::Float(n) => return format!("{field}:{}", numeric(item, &n.to_string())),
        SigmaValue::Bool(b) => return format!("{field}:{b}"),
        SigmaValue::Str(s) => s,
    };

    let term = if item.has(Modifier::Re) {
        escape::regex(s.as_plain())
    } else if item.has(Modifier::Cidr) {
        escape::quote(s.as_plain())
    } else {
        let mut pieces = s.pieces.clone();
        if item.has(Modifier::Contains) || item.has(Modifier::EndsWith) {
            pieces.insert(0, Piece::AnyChars);
        }
        if item.has(Modifier::Contains) || item.has(Modifier::StartsWith) {
            pieces.push(Piece::AnyChars);
        }
        if pieces.len() == s.pieces.len() {
            escape::sigma_string(s)
        } else {
            escape::wildcard(&pieces)
        }
    };
    format!("{field}:{term}")
}

fn numeric(item: &DetectionItem, n: &str) -> String {
    let op = if item.has(Modifier::Lt) {
        "<"
    } else if item.has(Modifier::Lte) {
        "<="
    } else if item.has(Modifier::Gt) {
        ">"
    } else if item.has(Modifier::Gte) {
        ">="
    } else {
        return escape::escape_term(n);
    };
    format!("{op}{}", escape::escape_term(n))
}

fn keyword(value: &SigmaValue) -> String {
    match value {
        SigmaValue::Str(s) => escape::sigma_string(s),
        SigmaValue::Int(n) => escape::quote(&n.to_string()),
        SigmaValue::Float(n) => escape::quote(&n.to_string()),
        SigmaValue::Bool(b) => escape::quote(&b.to_string()),
        SigmaValue::Null => escape::quote("null"),
    }
}
