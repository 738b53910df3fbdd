//! Raw field name → schema field name mappings.

mod store;

pub use store::{FieldMappingStore, IndexFieldMappingStore, MappingStoreError};

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::rule::CompiledRule;

/// Raw field name → mapped field name, consulted by the strict compile pass.
pub type FieldMappingTable = BTreeMap<String, String>;

/// Turns the fields a discovery pass consulted into a mapping table.
pub trait FieldMappingResolver: Send + Sync {
    fn resolve(&self, fields: &IndexSet<String>) -> FieldMappingTable;
}

/// Maps every field to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMappingResolver;

impl FieldMappingResolver for IdentityMappingResolver {
    fn resolve(&self, fields: &IndexSet<String>) -> FieldMappingTable {
        fields.iter().map(|f| (f.clone(), f.clone())).collect()
    }
}

/// Stored association between a raw field and its schema names.
///
/// Document id in the field-mapping index is `raw_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub raw_field: String,
    /// Schema identifier (e.g. `ecs`) → field name in that schema.
    pub schema_fields: BTreeMap<String, String>,
    /// Categories whose rules use this field.
    pub log_types: BTreeSet<String>,
}

impl FieldMapping {
    /// Fold a newer mapping for the same raw field into this one.
    pub fn merge(&mut self, newer: FieldMapping) {
        self.schema_fields.extend(newer.schema_fields);
        self.log_types.extend(newer.log_types);
    }
}

/// One mapping per consulted field of `rule`, identity when `table` has no entry.
pub fn build_field_mappings(
    rule: &CompiledRule,
    table: &FieldMappingTable,
    default_schema: &str,
) -> Vec<FieldMapping> {
    rule.query_field_names
        .iter()
        .filter(|f| !f.is_empty())
        .map(|field| {
            let mapped = table.get(field).unwrap_or(field);
            FieldMapping {
                raw_field: field.clone(),
                schema_fields: BTreeMap::from([(default_schema.to_string(), mapped.clone())]),
                log_types: BTreeSet::from([rule.category.clone()]),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sigma::SigmaRule;

    fn compiled(fields: &[&str]) -> CompiledRule {
        let text = "title: t\ndetection:\n  sel:\n    a: 1\n  condition: sel\n";
        let parsed = SigmaRule::parse(text).unwrap();
        CompiledRule {
            id: parsed.id.to_string(),
            version: None,
            parsed,
            category: "network".into(),
            queries: Vec::new(),
            query_field_names: fields.iter().map(|f| f.to_string()).collect(),
            rule_text: text.into(),
        }
    }

    #[test]
    fn identity_resolver() {
        let fields: IndexSet<String> = ["src_ip", "dst_port"].iter().map(|s| s.to_string()).collect();
        let table = IdentityMappingResolver.resolve(&fields);
        assert_eq!(table.len(), 2);
        assert_eq!(table["src_ip"], "src_ip");
        assert_eq!(table["dst_port"], "dst_port");

        assert!(IdentityMappingResolver.resolve(&IndexSet::new()).is_empty());
    }

    #[test]
    fn builds_mappings_with_identity_fallback() {
        let rule = compiled(&["src_ip", "dst_port"]);
        let table = FieldMappingTable::from([("src_ip".to_string(), "source.ip".to_string())]);

        let mappings = build_field_mappings(&rule, &table, "ecs");
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].schema_fields["ecs"], "source.ip");
        assert_eq!(mappings[1].raw_field, "dst_port");
        assert_eq!(mappings[1].schema_fields["ecs"], "dst_port");
        assert!(mappings.iter().all(|m| m.log_types.contains("network")));
    }

    #[test]
    fn merge_unions_log_types() {
        let mut existing = FieldMapping {
            raw_field: "user.name".into(),
            schema_fields: BTreeMap::from([("ecs".into(), "user.name".into())]),
            log_types: BTreeSet::from(["authentication".into()]),
        };
        existing.merge(FieldMapping {
            raw_field: "user.name".into(),
            schema_fields: BTreeMap::from([("ecs".into(), "user.id".into())]),
            log_types: BTreeSet::from(["windows".into()]),
        });
        assert_eq!(existing.schema_fields["ecs"], "user.id");
        assert_eq!(existing.log_types.len(), 2);
    }
}
