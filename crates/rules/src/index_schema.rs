//! Index mappings the initializers create the rule and field-mapping
//! indices with.

use serde_json::{json, Value};

/// Mapping for the compiled-rule index. Field names follow
/// [`crate::rule::CompiledRule::to_document`].
pub fn rules_index() -> Value {
    let nested_value = |value: Value| json!({ "type": "nested", "properties": { "value": value } });

    json!({
        "settings": {
            "index": { "number_of_shards": 1, "auto_expand_replicas": "0-1", "hidden": true }
        },
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "rule": {
                    "properties": {
                        "category": { "type": "keyword" },
                        "title": { "type": "text", "fields": { "keyword": { "type": "keyword" } } },
                        "log_source": { "type": "object", "enabled": false },
                        "description": { "type": "text" },
                        "references": { "type": "keyword" },
                        "tags": { "type": "keyword" },
                        "level": { "type": "keyword" },
                        "false_positives": { "type": "text" },
                        "author": { "type": "text" },
                        "status": { "type": "keyword" },
                        "date": { "type": "keyword" },
                        "modified": { "type": "keyword" },
                        "last_update_time": { "type": "date", "format": "strict_date_time" },
                        "queries": nested_value(json!({ "type": "object", "enabled": false })),
                        "query_field_names": nested_value(json!({ "type": "keyword" })),
                        "rule": { "type": "text", "index": false }
                    }
                }
            }
        }
    })
}

/// Mapping for the field-mapping index; one document per raw field.
pub fn field_mappings_index() -> Value {
    json!({
        "settings": {
            "index": { "number_of_shards": 1, "auto_expand_replicas": "0-1", "hidden": true }
        },
        "mappings": {
            "properties": {
                "raw_field": { "type": "keyword" },
                "schema_fields": { "type": "object", "dynamic": true },
                "log_types": { "type": "keyword" }
            }
        }
    })
}
