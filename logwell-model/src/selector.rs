//! Selector grammar: `'{' key op "value" (',' key op "value")* '}'`.
//!
//! Ops are `=`, `!=`, `=~` and `!~`. The empty selector `{}` matches all
//! streams. Regex patterns are fully anchored, so `=~"api.*"` matches the
//! whole value, not a substring.

use std::fmt::{self, Display};
use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;

use crate::error::SelectorError;
use crate::labels::LabelSet;

/// Matcher operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    Neq,
    Re,
    NotRe,
}

impl MatchOp {
    /// Positive matchers (`=`, `=~`) are resolvable against the label
    /// index; negative ones are applied entry-by-entry by the executor.
    pub fn is_positive(self) -> bool {
        matches!(self, MatchOp::Eq | MatchOp::Re)
    }
}

impl Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchOp::Eq => "=",
            MatchOp::Neq => "!=",
            MatchOp::Re => "=~",
            MatchOp::NotRe => "!~",
        })
    }
}

/// One `key op "value"` clause.
#[derive(Debug, Clone)]
pub struct Matcher {
    key: String,
    op: MatchOp,
    value: String,
    regex: Option<Regex>,
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.op == other.op && self.value == other.value
    }
}

impl Matcher {
    pub fn new(key: String, op: MatchOp, value: String) -> Result<Self, SelectorError> {
        let regex = match op {
            MatchOp::Re | MatchOp::NotRe => Some(
                Regex::new(&format!("^(?:{value})$"))
                    .map_err(|err| SelectorError::Regex(err.to_string()))?,
            ),
            _ => None,
        };
        Ok(Self {
            key,
            op,
            value,
            regex,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn op(&self) -> MatchOp {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Test a single value against this matcher. An absent label reads as
    /// the empty string, so `!=` and `!~` also match streams that lack the
    /// key entirely.
    pub fn matches_value(&self, value: &str) -> bool {
        match self.op {
            MatchOp::Eq => value == self.value,
            MatchOp::Neq => value != self.value,
            MatchOp::Re => self.regex.as_ref().expect("compiled").is_match(value),
            MatchOp::NotRe => !self.regex.as_ref().expect("compiled").is_match(value),
        }
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.matches_value(labels.get(&self.key).unwrap_or(""))
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.key, self.op, self.value)
    }
}

/// A parsed selector: the conjunction of its matchers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    matchers: Vec<Matcher>,
}

impl Selector {
    /// The empty selector, equivalent to `{}`.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse()
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Full evaluation of all clauses against a label set.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.matchers.iter().all(|m| m.matches(labels))
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{m}")?;
        }
        write!(f, "}}")
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn parse(mut self) -> Result<Selector, SelectorError> {
        self.skip_ws();
        self.expect('{')?;
        self.skip_ws();

        let mut matchers = Vec::new();
        if self.peek() == Some('}') {
            self.chars.next();
        } else {
            loop {
                let key = self.ident()?;
                self.skip_ws();
                let op = self.op()?;
                self.skip_ws();
                let value = self.quoted_string()?;
                matchers.push(Matcher::new(key, op, value)?);

                self.skip_ws();
                match self.chars.next() {
                    Some(',') => self.skip_ws(),
                    Some('}') => break,
                    Some(c) => {
                        return Err(SelectorError::Syntax(format!(
                            "expected ',' or '}}', found {c:?}"
                        )));
                    }
                    None => {
                        return Err(SelectorError::Syntax("unbalanced braces".to_string()));
                    }
                }
            }
        }

        self.skip_ws();
        match self.chars.next() {
            None => Ok(Selector { matchers }),
            Some(c) => Err(SelectorError::Syntax(format!(
                "unexpected trailing input starting at {c:?}"
            ))),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(SelectorError::Syntax(format!(
                "expected {expected:?}, found {c:?}"
            ))),
            None => Err(SelectorError::Syntax(format!(
                "expected {expected:?}, found end of input"
            ))),
        }
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let mut out = String::new();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            out.push(self.chars.next().expect("peeked"));
        }
        if out.is_empty() {
            return Err(SelectorError::Syntax(match self.peek() {
                Some(c) => format!("expected label name, found {c:?}"),
                None => "expected label name, found end of input".to_string(),
            }));
        }
        Ok(out)
    }

    fn op(&mut self) -> Result<MatchOp, SelectorError> {
        match self.chars.next() {
            Some('=') => {
                if self.peek() == Some('~') {
                    self.chars.next();
                    Ok(MatchOp::Re)
                } else {
                    Ok(MatchOp::Eq)
                }
            }
            Some('!') => match self.chars.next() {
                Some('=') => Ok(MatchOp::Neq),
                Some('~') => Ok(MatchOp::NotRe),
                other => Err(SelectorError::Syntax(format!(
                    "expected '=' or '~' after '!', found {other:?}"
                ))),
            },
            Some(c) => Err(SelectorError::Syntax(format!(
                "expected matcher operator, found {c:?}"
            ))),
            None => Err(SelectorError::Syntax(
                "expected matcher operator, found end of input".to_string(),
            )),
        }
    }

    fn quoted_string(&mut self) -> Result<String, SelectorError> {
        match self.chars.next() {
            Some('"') => {}
            Some(c) => {
                return Err(SelectorError::Syntax(format!(
                    "expected quoted value, found {c:?}"
                )));
            }
            None => {
                return Err(SelectorError::Syntax(
                    "missing value for matcher".to_string(),
                ));
            }
        }
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    // Anything else passes through verbatim so regex
                    // classes like \d survive without double escaping.
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => {
                        return Err(SelectorError::Syntax(
                            "unterminated string value".to_string(),
                        ));
                    }
                },
                Some(c) => out.push(c),
                None => {
                    return Err(SelectorError::Syntax(
                        "unterminated string value".to_string(),
                    ));
                }
            }
        }
    }
}
