//! Compiled rule: what the persister writes to the rules index.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::sigma::SigmaRule;

/// A rule that passed the strict compile pass.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    /// Store version; `None` for a rule that has not been written yet.
    pub version: Option<i64>,
    pub parsed: SigmaRule,
    /// Lowercased log type the rule belongs to.
    pub category: String,
    pub queries: Vec<Value>,
    /// Raw field names consulted by the queries, in first-use order.
    pub query_field_names: Vec<String>,
    /// The rule text as submitted.
    pub rule_text: String,
}

#[derive(Serialize)]
struct ValueEntry<'a, T: Serialize> {
    value: &'a T,
}

impl CompiledRule {
    /// Body stored in the rules index.
    pub fn to_document(&self) -> Value {
        let rule = &self.parsed;
        let queries: Vec<ValueEntry<'_, Value>> = self
            .queries
            .iter()
            .map(|q| ValueEntry { value: q })
            .collect();
        let fields: Vec<ValueEntry<'_, String>> = self
            .query_field_names
            .iter()
            .map(|f| ValueEntry { value: f })
            .collect();

        json!({
            "rule": {
                "category": self.category,
                "title": rule.title,
                "log_source": rule.logsource,
                "description": rule.description,
                "references": rule.references,
                "tags": rule.tags,
                "level": rule.level,
                "false_positives": rule.false_positives,
                "author": rule.author,
                "status": rule.status,
                "date": rule.date,
                "modified": rule.modified,
                "last_update_time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "queries": queries,
                "query_field_names": fields,
                "rule": self.rule_text,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_layout() {
        let text = "title: Admin Logon\nlevel: high\ndate: 2024/03/01\nmodified: 2024/05/20\ntags: [a, b]\ndetection:\n  sel:\n    user.name: admin\n  condition: sel\n";
        let parsed = SigmaRule::parse(text).unwrap();
        let compiled = CompiledRule {
            id: parsed.id.to_string(),
            version: None,
            parsed,
            category: "authentication".into(),
            queries: vec![json!({"query": "user.name:\"admin\""})],
            query_field_names: vec!["user.name".into()],
            rule_text: text.into(),
        };

        let doc = compiled.to_document();
        let rule = &doc["rule"];
        assert_eq!(rule["category"], "authentication");
        assert_eq!(rule["title"], "Admin Logon");
        assert_eq!(rule["level"], "high");
        assert_eq!(rule["tags"], json!(["a", "b"]));
        assert_eq!(rule["date"], "2024/03/01");
        assert_eq!(rule["modified"], "2024/05/20");
        assert_eq!(rule["queries"], json!([{"value": {"query": "user.name:\"admin\""}}]));
        assert_eq!(rule["query_field_names"], json!([{"value": "user.name"}]));
        assert_eq!(rule["rule"], text);
        assert!(rule["last_update_time"].as_str().unwrap().ends_with('Z'));
    }
}
