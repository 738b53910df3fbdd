//! Tests for rule document parsing.

use super::*;

const AUTH_RULE_YAML: &str = r#"
title: Admin Logon
id: 5c2a6e1e-3f43-4f8a-9c1b-1d6f0b7e9a10
status: experimental
description: Interactive logon by the built-in admin account
author: detection team
references: https://example.com/logon
tags:
  - attack.t1078
falsepositives: Maintenance windows
level: high
logsource:
  product: windows
  category: authentication
detection:
  selection:
    user.name: admin
  filter:
    - src_ip|cidr: 10.0.0.0/8
    - src_ip|cidr: 192.168.0.0/16
  condition: selection and not filter
"#;

#[test]
fn parses_full_rule() {
    let rule = SigmaRule::parse(AUTH_RULE_YAML).unwrap();
    assert!(rule.is_valid(), "unexpected errors: {}", rule.errors);
    assert_eq!(rule.title, "Admin Logon");
    assert_eq!(rule.id.to_string(), "5c2a6e1e-3f43-4f8a-9c1b-1d6f0b7e9a10");
    assert_eq!(rule.level, Some(Level::High));
    assert_eq!(rule.references, vec!["https://example.com/logon"]);
    assert_eq!(rule.false_positives, vec!["Maintenance windows"]);
    assert_eq!(rule.logsource.category.as_deref(), Some("authentication"));
    assert_eq!(rule.detection.identifier_names(), vec!["selection", "filter"]);
    assert_eq!(rule.detection.conditions.len(), 1);
}

#[test]
fn missing_id_is_derived_from_text() {
    let text = "title: t\ndetection:\n  sel:\n    a: 1\n  condition: sel\n";
    let first = SigmaRule::parse(text).unwrap();
    let second = SigmaRule::parse(text).unwrap();
    assert!(first.is_valid());
    assert!(!first.id.is_nil());
    assert_eq!(first.id.get_version_num(), 5);
    assert_eq!(first.id, second.id);

    let other = SigmaRule::parse("title: t\ndetection:\n  sel:\n    a: 2\n  condition: sel\n").unwrap();
    assert_ne!(first.id, other.id);
}

#[test]
fn condition_list_yields_one_condition_each() {
    let text = "title: t\ndetection:\n  a:\n    x: 1\n  b:\n    y: 2\n  condition:\n    - a\n    - b\n";
    let rule = SigmaRule::parse(text).unwrap();
    assert!(rule.is_valid());
    assert_eq!(rule.detection.conditions.len(), 2);
}

#[test]
fn structural_failures_are_parse_errors() {
    assert_eq!(SigmaRule::parse(""), Err(ParseError::Empty));
    assert_eq!(SigmaRule::parse("   \n"), Err(ParseError::Empty));
    assert_eq!(SigmaRule::parse("- a\n- b\n"), Err(ParseError::NotMapping));
    assert!(matches!(SigmaRule::parse("title: [unclosed"), Err(ParseError::Yaml(_))));
}

#[test]
fn collects_every_semantic_error() {
    let text = r#"
id: not-a-uuid
level: severe
detection:
  selection:
    field|base64: x
  condition: selection or missing
"#;
    let rule = SigmaRule::parse(text).unwrap();
    assert!(!rule.is_valid());
    let errors = rule.errors.errors();
    assert!(errors.contains(&SigmaError::MissingField("title")));
    assert!(errors.contains(&SigmaError::InvalidId("not-a-uuid".into())));
    assert!(errors.contains(&SigmaError::InvalidLevel("severe".into())));
    assert!(errors.contains(&SigmaError::UnknownModifier {
        field: "field".into(),
        modifier: "base64".into(),
    }));
    assert!(errors.contains(&SigmaError::UndefinedIdentifier("missing".into())));
    // The broken `selection` body is declared, so it is not also undefined.
    assert!(!errors.contains(&SigmaError::UndefinedIdentifier("selection".into())));
    assert_eq!(errors.len(), 5);
}

#[test]
fn missing_detection_and_condition() {
    let rule = SigmaRule::parse("title: t\n").unwrap();
    assert_eq!(rule.errors.errors(), &[SigmaError::MissingField("detection")]);

    let rule = SigmaRule::parse("title: t\ndetection:\n  sel:\n    a: 1\n").unwrap();
    assert_eq!(
        rule.errors.errors(),
        &[SigmaError::MissingField("detection.condition")]
    );
}

#[test]
fn malformed_condition_and_unmatched_pattern() {
    let rule = SigmaRule::parse("title: t\ndetection:\n  sel:\n    a: 1\n  condition: sel and (\n").unwrap();
    assert!(matches!(rule.errors.errors(), [SigmaError::Condition { .. }]));

    let rule = SigmaRule::parse("title: t\ndetection:\n  sel:\n    a: 1\n  condition: 1 of filter_*\n").unwrap();
    assert_eq!(
        rule.errors.errors(),
        &[SigmaError::UndefinedIdentifier("filter_*".into())]
    );
}
