//! Requests and responses of the indexing operations.

use serde::{Deserialize, Serialize};

use detect_core::{RefreshPolicy, WriteAck, WriteStatus};

use super::error::IndexRuleError;

/// A rule to compile and index under a log category.
#[derive(Debug, Clone)]
pub struct RuleRequest {
    rule_text: String,
    category: String,
    force: bool,
    refresh: RefreshPolicy,
}

impl RuleRequest {
    /// The category is trimmed and lowercased.
    pub fn new(rule_text: impl Into<String>, category: impl AsRef<str>) -> Self {
        Self {
            rule_text: rule_text.into(),
            category: category.as_ref().trim().to_ascii_lowercase(),
            force: false,
            refresh: RefreshPolicy::default(),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn rule_text(&self) -> &str {
        &self.rule_text
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn refresh(&self) -> RefreshPolicy {
        self.refresh
    }

    pub fn validate(&self) -> Result<(), IndexRuleError> {
        if self.category.is_empty() {
            return Err(IndexRuleError::InvalidRequest("rule category is missing".into()));
        }
        Ok(())
    }
}

/// Remove a compiled rule by id.
#[derive(Debug, Clone)]
pub struct DeleteRuleRequest {
    pub rule_id: String,
    pub refresh: RefreshPolicy,
    pub force: bool,
}

impl DeleteRuleRequest {
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            refresh: RefreshPolicy::default(),
            force: false,
        }
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn validate(&self) -> Result<(), IndexRuleError> {
        if self.rule_id.trim().is_empty() {
            return Err(IndexRuleError::InvalidRequest("ruleId is missing".into()));
        }
        Ok(())
    }
}

/// Successful indexing outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRuleResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: i64,
    pub status: WriteStatus,
}

impl From<WriteAck> for IndexRuleResponse {
    fn from(ack: WriteAck) -> Self {
        Self {
            id: ack.id,
            version: ack.version,
            status: ack.status,
        }
    }
}

/// Successful delete outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRuleResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: i64,
}

impl From<WriteAck> for DeleteRuleResponse {
    fn from(ack: WriteAck) -> Self {
        Self {
            id: ack.id,
            version: ack.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_is_normalised() {
        let req = RuleRequest::new("title: t", "  Windows ");
        assert_eq!(req.category(), "windows");
        assert!(req.validate().is_ok());
        assert!(!req.force());
        assert_eq!(req.refresh(), RefreshPolicy::None);
    }

    #[test]
    fn empty_category_is_rejected() {
        let err = RuleRequest::new("title: t", "   ").validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid request: rule category is missing");
    }

    #[test]
    fn empty_rule_id_is_rejected() {
        let err = DeleteRuleRequest::new("").validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid request: ruleId is missing");
    }

    #[test]
    fn response_uses_store_field_names() {
        let resp = IndexRuleResponse::from(WriteAck {
            id: "r1".into(),
            version: 3,
            status: WriteStatus::Updated,
        });
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            serde_json::json!({"_id": "r1", "_version": 3, "status": "updated"})
        );
    }
}
