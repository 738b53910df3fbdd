//! Condition expressions: `selection and not (filter1 or 1 of filter_*)`.
//!
//! Precedence is `not` > `and` > `or`. Anything after a `|` is kept as an
//! aggregation clause; the query backend decides whether it can express it.

use std::fmt;

/// Which search identifiers an `1 of` / `all of` quantifier ranges over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierPattern {
    /// Every identifier not starting with `_`.
    Them,
    /// An identifier name, optionally containing `*`.
    Glob(String),
}

impl IdentifierPattern {
    /// Names from `defined` selected by this pattern, in declaration order.
    pub fn expand<'a>(&self, defined: &[&'a str]) -> Vec<&'a str> {
        defined
            .iter()
            .copied()
            .filter(|name| match self {
                IdentifierPattern::Them => !name.starts_with('_'),
                IdentifierPattern::Glob(glob) => glob_match(glob, name),
            })
            .collect()
    }
}

impl fmt::Display for IdentifierPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierPattern::Them => write!(f, "them"),
            IdentifierPattern::Glob(g) => write!(f, "{g}"),
        }
    }
}

/// Parsed condition expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Identifier(String),
    Not(Box<ConditionExpr>),
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    OneOf(IdentifierPattern),
    AllOf(IdentifierPattern),
}

impl ConditionExpr {
    /// Names and patterns this expression refers to, depth-first.
    pub fn references(&self) -> Vec<Reference<'_>> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<Reference<'a>>) {
        match self {
            ConditionExpr::Identifier(name) => out.push(Reference::Name(name)),
            ConditionExpr::Not(inner) => inner.collect_references(out),
            ConditionExpr::And(terms) | ConditionExpr::Or(terms) => {
                for term in terms {
                    term.collect_references(out);
                }
            }
            ConditionExpr::OneOf(p) | ConditionExpr::AllOf(p) => out.push(Reference::Pattern(p)),
        }
    }
}

/// A single reference from a condition to the identifiers it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    Name(&'a str),
    Pattern(&'a IdentifierPattern),
}

/// One entry of the rule's `condition` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The condition as written in the rule.
    pub source: String,
    pub expr: ConditionExpr,
    /// Raw text after `|`, e.g. `count() by src_ip > 5`.
    pub aggregation: Option<String>,
}

impl Condition {
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let (search, aggregation) = match source.split_once('|') {
            Some((search, agg)) => (search, Some(agg.trim().to_string())),
            None => (source, None),
        };

        let tokens = tokenize(search);
        if tokens.is_empty() {
            return Err("condition is empty".into());
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected '{token}'"));
        }

        Ok(Self {
            source: source.trim().to_string(),
            expr,
            aggregation,
        })
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Of,
    One,
    All,
    Them,
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Of => write!(f, "of"),
            Token::One => write!(f, "1"),
            Token::All => write!(f, "all"),
            Token::Them => write!(f, "them"),
            Token::Word(w) => write!(f, "{w}"),
        }
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if word.is_empty() {
            return;
        }
        let token = match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "of" => Token::Of,
            "1" | "any" => Token::One,
            "all" => Token::All,
            "them" => Token::Them,
            _ => Token::Word(word.clone()),
        };
        tokens.push(token);
        word.clear();
    };

    for c in input.chars() {
        match c {
            '(' | ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(if c == '(' { Token::LParen } else { Token::RParen });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

// ── Recursive descent ───────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> std::result::Result<ConditionExpr, String> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            ConditionExpr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> std::result::Result<ConditionExpr, String> {
        let mut terms = vec![self.parse_not()?];
        while self.eat(&Token::And) {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            ConditionExpr::And(terms)
        })
    }

    fn parse_not(&mut self) -> std::result::Result<ConditionExpr, String> {
        if self.eat(&Token::Not) {
            return Ok(ConditionExpr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> std::result::Result<ConditionExpr, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing closing parenthesis".into());
                }
                Ok(inner)
            }
            Some(quantifier @ (Token::One | Token::All)) => {
                if !self.eat(&Token::Of) {
                    return Err(format!("expected 'of' after '{quantifier}'"));
                }
                let pattern = match self.next() {
                    Some(Token::Them) => IdentifierPattern::Them,
                    Some(Token::Word(w)) => IdentifierPattern::Glob(w),
                    Some(other) => return Err(format!("unexpected '{other}' after 'of'")),
                    None => return Err("expected identifier pattern after 'of'".into()),
                };
                Ok(if quantifier == Token::One {
                    ConditionExpr::OneOf(pattern)
                } else {
                    ConditionExpr::AllOf(pattern)
                })
            }
            Some(Token::Word(name)) => Ok(ConditionExpr::Identifier(name)),
            Some(other) => Err(format!("unexpected '{other}'")),
            None => Err("unexpected end of condition".into()),
        }
    }
}

/// `*`-only glob match used for identifier patterns.
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && p[pi] != '*' && p[pi] == n[ni] {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> ConditionExpr {
        ConditionExpr::Identifier(name.to_string())
    }

    #[test]
    fn precedence_not_and_or() {
        let cond = Condition::parse("a or b and not c").unwrap();
        assert_eq!(
            cond.expr,
            ConditionExpr::Or(vec![
                ident("a"),
                ConditionExpr::And(vec![ident("b"), ConditionExpr::Not(Box::new(ident("c")))]),
            ])
        );
        assert!(cond.aggregation.is_none());
    }

    #[test]
    fn parentheses_override_precedence() {
        let cond = Condition::parse("(a or b) and c").unwrap();
        assert_eq!(
            cond.expr,
            ConditionExpr::And(vec![ConditionExpr::Or(vec![ident("a"), ident("b")]), ident("c")])
        );
    }

    #[test]
    fn quantifiers() {
        let cond = Condition::parse("1 of selection_* and not all of them").unwrap();
        assert_eq!(
            cond.expr,
            ConditionExpr::And(vec![
                ConditionExpr::OneOf(IdentifierPattern::Glob("selection_*".into())),
                ConditionExpr::Not(Box::new(ConditionExpr::AllOf(IdentifierPattern::Them))),
            ])
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let cond = Condition::parse("sel AND NOT filter").unwrap();
        assert_eq!(
            cond.expr,
            ConditionExpr::And(vec![ident("sel"), ConditionExpr::Not(Box::new(ident("filter")))])
        );
    }

    #[test]
    fn aggregation_is_split_off() {
        let cond = Condition::parse("selection | count() by src_ip > 10").unwrap();
        assert_eq!(cond.expr, ident("selection"));
        assert_eq!(cond.aggregation.as_deref(), Some("count() by src_ip > 10"));
    }

    #[test]
    fn malformed_conditions() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse("(a or b").is_err());
        assert!(Condition::parse("a and").is_err());
        assert!(Condition::parse("1 selection").is_err());
        assert!(Condition::parse("a b").is_err());
    }

    #[test]
    fn pattern_expansion() {
        let defined = ["selection_a", "selection_b", "filter", "_hidden"];
        assert_eq!(
            IdentifierPattern::Glob("selection_*".into()).expand(&defined),
            vec!["selection_a", "selection_b"]
        );
        assert_eq!(
            IdentifierPattern::Them.expand(&defined),
            vec!["selection_a", "selection_b", "filter"]
        );
        assert!(glob_match("*_b", "selection_b"));
        assert!(!glob_match("sel*x", "selection_b"));
    }
}
