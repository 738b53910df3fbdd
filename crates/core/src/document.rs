use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Controls when a written document becomes visible to searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Visible after the next periodic refresh.
    #[default]
    None,
    /// Force a refresh as part of the write.
    Immediate,
    /// Block the write until a refresh makes it visible.
    WaitUntil,
}

impl RefreshPolicy {
    /// Value of the `refresh` query parameter on OpenSearch write APIs.
    pub fn as_param(&self) -> &'static str {
        match self {
            RefreshPolicy::None => "false",
            RefreshPolicy::Immediate => "true",
            RefreshPolicy::WaitUntil => "wait_for",
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPolicy::None => write!(f, "none"),
            RefreshPolicy::Immediate => write!(f, "immediate"),
            RefreshPolicy::WaitUntil => write!(f, "wait_until"),
        }
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "false" => Ok(RefreshPolicy::None),
            "immediate" | "true" => Ok(RefreshPolicy::Immediate),
            "wait_until" | "wait_for" => Ok(RefreshPolicy::WaitUntil),
            other => Err(format!("unknown refresh policy: '{}'", other)),
        }
    }
}

/// Outcome of a single-document write as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStatus::Created => write!(f, "created"),
            WriteStatus::Updated => write!(f, "updated"),
            WriteStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Acknowledgement returned by a document write or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    pub id: String,
    /// Store-assigned version; 1 for a freshly created document.
    pub version: i64,
    pub status: WriteStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_policy_params() {
        assert_eq!(RefreshPolicy::None.as_param(), "false");
        assert_eq!(RefreshPolicy::Immediate.as_param(), "true");
        assert_eq!(RefreshPolicy::WaitUntil.as_param(), "wait_for");
    }

    #[test]
    fn refresh_policy_parses_both_spellings() {
        assert_eq!("wait_for".parse::<RefreshPolicy>(), Ok(RefreshPolicy::WaitUntil));
        assert_eq!("IMMEDIATE".parse::<RefreshPolicy>(), Ok(RefreshPolicy::Immediate));
        assert!("sometimes".parse::<RefreshPolicy>().is_err());
    }
}
