//! Search identifiers: the named field/value blocks under `detection`.

use std::fmt;
use std::str::FromStr;

use serde_yaml::Value;

use super::error::{SigmaError, SigmaErrors};

/// Value modifiers appended to a field name with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Contains,
    StartsWith,
    EndsWith,
    All,
    Re,
    Cidr,
    Lt,
    Lte,
    Gt,
    Gte,
    Exists,
}

impl Modifier {
    fn is_numeric(&self) -> bool {
        matches!(self, Modifier::Lt | Modifier::Lte | Modifier::Gt | Modifier::Gte)
    }

    fn is_position(&self) -> bool {
        matches!(self, Modifier::Contains | Modifier::StartsWith | Modifier::EndsWith)
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modifier::Contains => "contains",
            Modifier::StartsWith => "startswith",
            Modifier::EndsWith => "endswith",
            Modifier::All => "all",
            Modifier::Re => "re",
            Modifier::Cidr => "cidr",
            Modifier::Lt => "lt",
            Modifier::Lte => "lte",
            Modifier::Gt => "gt",
            Modifier::Gte => "gte",
            Modifier::Exists => "exists",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "contains" => Ok(Modifier::Contains),
            "startswith" => Ok(Modifier::StartsWith),
            "endswith" => Ok(Modifier::EndsWith),
            "all" => Ok(Modifier::All),
            "re" => Ok(Modifier::Re),
            "cidr" => Ok(Modifier::Cidr),
            "lt" => Ok(Modifier::Lt),
            "lte" => Ok(Modifier::Lte),
            "gt" => Ok(Modifier::Gt),
            "gte" => Ok(Modifier::Gte),
            "exists" => Ok(Modifier::Exists),
            other => Err(other.to_string()),
        }
    }
}

/// A scalar value from a detection item.
#[derive(Debug, Clone, PartialEq)]
pub enum SigmaValue {
    Str(SigmaString),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SigmaValue {
    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(SigmaValue::Str(SigmaString::parse(s))),
            Value::Number(n) => n
                .as_i64()
                .map(SigmaValue::Int)
                .or_else(|| n.as_f64().map(SigmaValue::Float)),
            Value::Bool(b) => Some(SigmaValue::Bool(*b)),
            Value::Null => Some(SigmaValue::Null),
            Value::Tagged(tagged) => SigmaValue::from_yaml(&tagged.value),
            Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, SigmaValue::Int(_) | SigmaValue::Float(_))
    }
}

/// One piece of a Sigma string after wildcard handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    /// Unescaped `*`.
    AnyChars,
    /// Unescaped `?`.
    OneChar,
}

/// A string value split into literal runs and Sigma wildcards.
///
/// `\*`, `\?` and `\\` are literal; bare `*` and `?` are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigmaString {
    pub original: String,
    pub pieces: Vec<Piece>,
}

impl SigmaString {
    pub fn parse(s: &str) -> Self {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.peek() {
                    Some(&next @ ('*' | '?' | '\\')) => {
                        literal.push(next);
                        chars.next();
                    }
                    _ => literal.push('\\'),
                },
                '*' | '?' => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(if c == '*' { Piece::AnyChars } else { Piece::OneChar });
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Self {
            original: s.to_string(),
            pieces,
        }
    }

    pub fn has_wildcards(&self) -> bool {
        self.pieces.iter().any(|p| !matches!(p, Piece::Literal(_)))
    }

    /// The value exactly as written; regex and CIDR values bypass wildcard handling.
    pub fn as_plain(&self) -> &str {
        &self.original
    }
}

/// `field|mod1|mod2: value(s)` inside a search identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionItem {
    pub field: String,
    pub modifiers: Vec<Modifier>,
    pub values: Vec<SigmaValue>,
}

impl DetectionItem {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// Body of a named search identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchIdentifier {
    /// A single mapping: every item must match.
    AllOf(Vec<DetectionItem>),
    /// A list of mappings: any one of them must match.
    AnyOf(Vec<Vec<DetectionItem>>),
    /// A list of plain values searched across the whole event.
    Keywords(Vec<SigmaValue>),
}

impl SearchIdentifier {
    /// Parse the YAML body of identifier `name`, recording problems in `errors`.
    pub(crate) fn parse(name: &str, value: &Value, errors: &mut SigmaErrors) -> Option<Self> {
        match value {
            Value::Mapping(map) => {
                let items = parse_mapping(name, map, errors)?;
                if items.is_empty() {
                    errors.push(SigmaError::EmptyIdentifier(name.to_string()));
                    return None;
                }
                Some(SearchIdentifier::AllOf(items))
            }
            Value::Sequence(seq) if seq.is_empty() => {
                errors.push(SigmaError::EmptyIdentifier(name.to_string()));
                None
            }
            Value::Sequence(seq) if seq.iter().all(|v| v.is_mapping()) => {
                let mut groups = Vec::with_capacity(seq.len());
                for entry in seq {
                    if let Value::Mapping(map) = entry {
                        let group = parse_mapping(name, map, errors)?;
                        if group.is_empty() {
                            errors.push(SigmaError::EmptyIdentifier(name.to_string()));
                            return None;
                        }
                        groups.push(group);
                    }
                }
                Some(SearchIdentifier::AnyOf(groups))
            }
            Value::Sequence(seq) => {
                let mut keywords = Vec::with_capacity(seq.len());
                for entry in seq {
                    match SigmaValue::from_yaml(entry) {
                        Some(v) => keywords.push(v),
                        None => {
                            errors.push(SigmaError::InvalidValue {
                                field: name.to_string(),
                                reason: "keyword lists may only contain scalar values".into(),
                            });
                            return None;
                        }
                    }
                }
                Some(SearchIdentifier::Keywords(keywords))
            }
            Value::Null => {
                errors.push(SigmaError::EmptyIdentifier(name.to_string()));
                None
            }
            scalar => match SigmaValue::from_yaml(scalar) {
                Some(v) => Some(SearchIdentifier::Keywords(vec![v])),
                None => {
                    errors.push(SigmaError::InvalidValue {
                        field: name.to_string(),
                        reason: "unsupported search identifier body".into(),
                    });
                    None
                }
            },
        }
    }

    /// Every field referenced by this identifier, in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            SearchIdentifier::AllOf(items) => items.iter().map(|i| i.field.as_str()).collect(),
            SearchIdentifier::AnyOf(groups) => groups
                .iter()
                .flat_map(|g| g.iter().map(|i| i.field.as_str()))
                .collect(),
            SearchIdentifier::Keywords(_) => Vec::new(),
        }
    }
}

fn parse_mapping(
    name: &str,
    map: &serde_yaml::Mapping,
    errors: &mut SigmaErrors,
) -> Option<Vec<DetectionItem>> {
    let before = errors.len();
    let mut items = Vec::with_capacity(map.len());

    for (key, value) in map {
        let Some(key) = key.as_str() else {
            errors.push(SigmaError::InvalidValue {
                field: name.to_string(),
                reason: format!("field names must be strings, got {key:?}"),
            });
            continue;
        };
        if let Some(item) = parse_item(key, value, errors) {
            items.push(item);
        }
    }

    if errors.len() > before {
        None
    } else {
        Some(items)
    }
}

fn parse_item(key: &str, value: &Value, errors: &mut SigmaErrors) -> Option<DetectionItem> {
    let mut parts = key.split('|');
    let field = parts.next().unwrap_or_default().trim().to_string();
    if field.is_empty() {
        errors.push(SigmaError::InvalidValue {
            field: key.to_string(),
            reason: "field name is empty".into(),
        });
        return None;
    }

    let mut modifiers = Vec::new();
    for raw in parts {
        match raw.parse::<Modifier>() {
            Ok(m) => modifiers.push(m),
            Err(unknown) => {
                errors.push(SigmaError::UnknownModifier {
                    field: field.clone(),
                    modifier: unknown,
                });
                return None;
            }
        }
    }

    let values = match value {
        Value::Sequence(seq) if seq.is_empty() => {
            errors.push(SigmaError::InvalidValue {
                field: field.clone(),
                reason: "empty value list".into(),
            });
            return None;
        }
        Value::Sequence(seq) => seq.iter().map(SigmaValue::from_yaml).collect::<Option<Vec<_>>>(),
        scalar => SigmaValue::from_yaml(scalar).map(|v| vec![v]),
    };
    let Some(values) = values else {
        errors.push(SigmaError::InvalidValue {
            field: field.clone(),
            reason: "values must be scalars or a list of scalars".into(),
        });
        return None;
    };

    let item = DetectionItem {
        field,
        modifiers,
        values,
    };
    match check_modifiers(&item) {
        Ok(()) => Some(item),
        Err(reason) => {
            errors.push(SigmaError::InvalidModifier {
                field: item.field.clone(),
                reason,
            });
            None
        }
    }
}

/// Reject modifier combinations and value types the backend cannot express.
fn check_modifiers(item: &DetectionItem) -> std::result::Result<(), String> {
    let mods = &item.modifiers;
    let positional = mods.iter().filter(|m| m.is_position()).count();
    let numeric = mods.iter().filter(|m| m.is_numeric()).count();
    let exclusive = mods
        .iter()
        .filter(|m| matches!(m, Modifier::Re | Modifier::Cidr | Modifier::Exists))
        .count();

    if positional > 1 {
        return Err("only one of contains, startswith, endswith may be used".into());
    }
    if numeric > 1 {
        return Err("only one comparison modifier may be used".into());
    }
    if exclusive > 1 || (exclusive == 1 && (positional > 0 || numeric > 0)) {
        return Err("re, cidr and exists cannot be combined with other value modifiers".into());
    }
    if positional > 0 && numeric > 0 {
        return Err("string and numeric modifiers cannot be combined".into());
    }

    for m in mods {
        match m {
            Modifier::Re | Modifier::Cidr | Modifier::Contains | Modifier::StartsWith | Modifier::EndsWith => {
                if !item.values.iter().all(|v| matches!(v, SigmaValue::Str(_))) {
                    return Err(format!("'{m}' requires string values"));
                }
            }
            Modifier::Lt | Modifier::Lte | Modifier::Gt | Modifier::Gte => {
                if !item.values.iter().all(SigmaValue::is_numeric) {
                    return Err(format!("'{m}' requires numeric values"));
                }
            }
            Modifier::Exists => {
                if !matches!(item.values.as_slice(), [SigmaValue::Bool(_)]) {
                    return Err("'exists' requires a single boolean".into());
                }
            }
            Modifier::All => {}
        }
    }

    if item.has(Modifier::Cidr) {
        for v in &item.values {
            if let SigmaValue::Str(s) = v {
                if !s.as_plain().contains('/') {
                    return Err(format!("'{}' is not a CIDR block", s.as_plain()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> (Option<SearchIdentifier>, SigmaErrors) {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let mut errors = SigmaErrors::new();
        let ident = SearchIdentifier::parse("selection", &value, &mut errors);
        (ident, errors)
    }

    #[test]
    fn sigma_string_wildcards_and_escapes() {
        let s = SigmaString::parse(r"C:\Windows\\*\cmd?.exe");
        assert!(s.has_wildcards());
        assert_eq!(
            s.pieces,
            vec![
                Piece::Literal(r"C:\Windows\".into()),
                Piece::AnyChars,
                Piece::Literal(r"\cmd".into()),
                Piece::OneChar,
                Piece::Literal(".exe".into()),
            ]
        );

        let escaped = SigmaString::parse(r"literal\*star");
        assert!(!escaped.has_wildcards());
        assert_eq!(escaped.pieces, vec![Piece::Literal("literal*star".into())]);
    }

    #[test]
    fn mapping_becomes_all_of() {
        let (ident, errors) = parse("user.name: admin\nevent.code|gte: 4624\n");
        assert!(errors.is_empty());
        match ident.unwrap() {
            SearchIdentifier::AllOf(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].modifiers, vec![Modifier::Gte]);
                assert_eq!(items[1].values, vec![SigmaValue::Int(4624)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn list_of_maps_becomes_any_of() {
        let (ident, errors) = parse("- a: 1\n- b|contains: x\n");
        assert!(errors.is_empty());
        assert!(matches!(ident, Some(SearchIdentifier::AnyOf(ref g)) if g.len() == 2));
        assert_eq!(ident.unwrap().fields(), vec!["a", "b"]);
    }

    #[test]
    fn scalar_list_becomes_keywords() {
        let (ident, _) = parse("- mimikatz\n- 'sekurlsa::'\n");
        assert!(matches!(ident, Some(SearchIdentifier::Keywords(ref k)) if k.len() == 2));
    }

    #[test]
    fn unknown_modifier_is_reported() {
        let (ident, errors) = parse("CommandLine|base64offset: abc\n");
        assert!(ident.is_none());
        assert_eq!(
            errors.errors(),
            &[SigmaError::UnknownModifier {
                field: "CommandLine".into(),
                modifier: "base64offset".into(),
            }]
        );
    }

    #[test]
    fn conflicting_modifiers_are_reported() {
        let (_, errors) = parse("path|contains|endswith: x\n");
        assert!(matches!(errors.errors()[0], SigmaError::InvalidModifier { .. }));

        let (_, errors) = parse("port|gt: high\n");
        assert!(matches!(errors.errors()[0], SigmaError::InvalidModifier { .. }));

        let (_, errors) = parse("src_ip|cidr: 10.0.0.1\n");
        assert!(matches!(errors.errors()[0], SigmaError::InvalidModifier { .. }));
    }

    #[test]
    fn empty_bodies_are_reported() {
        let (_, errors) = parse("{}");
        assert_eq!(errors.errors(), &[SigmaError::EmptyIdentifier("selection".into())]);

        let (_, errors) = parse("field: []");
        assert!(matches!(errors.errors()[0], SigmaError::InvalidValue { .. }));
    }
}
