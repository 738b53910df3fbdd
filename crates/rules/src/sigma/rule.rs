//! Rule documents: metadata, log source and the detection block.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use uuid::Uuid;

use super::condition::{Condition, Reference};
use super::detection::SearchIdentifier;
use super::error::{ParseError, SigmaError, SigmaErrors};

/// Namespace for ids derived from the text of rules that carry none.
const RULE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d7a_94e3_4b85_a0d2_3c5e_8b71_f409);

/// Rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Informational => "informational",
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "informational" => Ok(Level::Informational),
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            "critical" => Ok(Level::Critical),
            _ => Err(s.to_string()),
        }
    }
}

/// Which logs a rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// Named search identifiers plus the conditions combining them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub identifiers: IndexMap<String, SearchIdentifier>,
    /// One entry per backend query.
    pub conditions: Vec<Condition>,
}

impl Detection {
    pub fn identifier_names(&self) -> Vec<&str> {
        self.identifiers.keys().map(String::as_str).collect()
    }
}

/// A parsed rule together with every semantic problem found in it.
///
/// A rule with a non-empty `errors` list must not be compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmaRule {
    pub id: Uuid,
    pub title: String,
    pub status: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub modified: Option<String>,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub false_positives: Vec<String>,
    pub level: Option<Level>,
    pub logsource: LogSource,
    pub detection: Detection,
    pub errors: SigmaErrors,
}

/// Header fields read in the first pass; `detection` stays raw YAML.
#[derive(Debug, Deserialize)]
struct RawSigmaRule {
    title: Option<String>,
    id: Option<String>,
    status: Option<String>,
    description: Option<String>,
    author: Option<String>,
    date: Option<String>,
    modified: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    references: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    falsepositives: Vec<String>,
    level: Option<String>,
    #[serde(default)]
    logsource: LogSource,
    detection: Option<serde_yaml::Mapping>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

impl SigmaRule {
    /// Parse rule text. Structural failures are `Err`; semantic problems are
    /// collected into [`SigmaRule::errors`].
    pub fn parse(text: &str) -> std::result::Result<Self, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let value: Value = serde_yaml::from_str(text).map_err(|e| ParseError::Yaml(e.to_string()))?;
        match value {
            Value::Null => return Err(ParseError::Empty),
            Value::Mapping(_) => {}
            _ => return Err(ParseError::NotMapping),
        }
        let raw: RawSigmaRule =
            serde_yaml::from_value(value).map_err(|e| ParseError::Yaml(e.to_string()))?;

        let mut errors = SigmaErrors::new();

        let title = match raw.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                errors.push(SigmaError::MissingField("title"));
                String::new()
            }
        };

        let id = match raw.id.as_deref().map(str::trim) {
            None | Some("") => Uuid::new_v5(&RULE_ID_NAMESPACE, text.as_bytes()),
            Some(s) => Uuid::parse_str(s).unwrap_or_else(|_| {
                errors.push(SigmaError::InvalidId(s.to_string()));
                Uuid::nil()
            }),
        };

        let level = raw.level.as_deref().and_then(|l| match l.parse::<Level>() {
            Ok(level) => Some(level),
            Err(bad) => {
                errors.push(SigmaError::InvalidLevel(bad));
                None
            }
        });

        let detection = match raw.detection {
            Some(map) => parse_detection(&map, &mut errors),
            None => {
                errors.push(SigmaError::MissingField("detection"));
                Detection::default()
            }
        };

        Ok(Self {
            id,
            title,
            status: raw.status,
            description: raw.description,
            author: raw.author,
            date: raw.date,
            modified: raw.modified,
            references: raw.references,
            tags: raw.tags,
            false_positives: raw.falsepositives,
            level,
            logsource: raw.logsource,
            detection,
            errors,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn parse_detection(map: &serde_yaml::Mapping, errors: &mut SigmaErrors) -> Detection {
    let mut identifiers = IndexMap::new();
    // Includes identifiers whose body failed to parse, so a broken body is
    // not also reported as undefined.
    let mut declared: Vec<&str> = Vec::new();
    let mut raw_conditions = None;

    for (key, body) in map {
        let Some(name) = key.as_str() else {
            errors.push(SigmaError::InvalidValue {
                field: "detection".into(),
                reason: format!("identifier names must be strings, got {key:?}"),
            });
            continue;
        };
        if name == "condition" {
            raw_conditions = Some(body);
            continue;
        }
        declared.push(name);
        if let Some(ident) = SearchIdentifier::parse(name, body, errors) {
            identifiers.insert(name.to_string(), ident);
        }
    }

    let sources: Vec<&str> = match raw_conditions {
        None | Some(Value::Null) => {
            errors.push(SigmaError::MissingField("detection.condition"));
            Vec::new()
        }
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Sequence(seq)) if seq.is_empty() => {
            errors.push(SigmaError::MissingField("detection.condition"));
            Vec::new()
        }
        Some(Value::Sequence(seq)) => {
            let strings: Option<Vec<&str>> = seq.iter().map(Value::as_str).collect();
            strings.unwrap_or_else(|| {
                errors.push(SigmaError::Condition {
                    condition: format!("{seq:?}"),
                    reason: "condition list entries must be strings".into(),
                });
                Vec::new()
            })
        }
        Some(other) => {
            errors.push(SigmaError::Condition {
                condition: format!("{other:?}"),
                reason: "condition must be a string or a list of strings".into(),
            });
            Vec::new()
        }
    };

    let mut conditions = Vec::with_capacity(sources.len());
    for source in sources {
        match Condition::parse(source) {
            Ok(condition) => {
                check_references(&condition, &declared, errors);
                conditions.push(condition);
            }
            Err(reason) => errors.push(SigmaError::Condition {
                condition: source.to_string(),
                reason,
            }),
        }
    }

    Detection {
        identifiers,
        conditions,
    }
}

fn check_references(condition: &Condition, declared: &[&str], errors: &mut SigmaErrors) {
    for reference in condition.expr.references() {
        match reference {
            Reference::Name(name) => {
                if !declared.contains(&name) {
                    errors.push(SigmaError::UndefinedIdentifier(name.to_string()));
                }
            }
            Reference::Pattern(pattern) => {
                if pattern.expand(declared).is_empty() {
                    errors.push(SigmaError::UndefinedIdentifier(pattern.to_string()));
                }
            }
        }
    }
}
