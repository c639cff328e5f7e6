use std::fmt::{self, Display};

/// Errors produced when validating label keys and values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// The label map was empty where at least one pair is required.
    Empty,
    InvalidKey(String),
    InvalidValue { key: String, reason: String },
}

impl Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelError::Empty => write!(f, "label set must not be empty"),
            LabelError::InvalidKey(key) => write!(f, "invalid label key: {key:?}"),
            LabelError::InvalidValue { key, reason } => {
                write!(f, "invalid value for label {key:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for LabelError {}

/// Errors produced by the selector parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector text violates the `{key op "value", …}` grammar.
    Syntax(String),
    /// A `=~` / `!~` pattern failed to compile.
    Regex(String),
}

impl Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Syntax(msg) => write!(f, "selector syntax error: {msg}"),
            SelectorError::Regex(msg) => write!(f, "invalid selector regex: {msg}"),
        }
    }
}

impl std::error::Error for SelectorError {}

/// Error returned when a timestamp is neither unix nanoseconds nor RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError(pub String);

impl Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable timestamp: {:?}", self.0)
    }
}

impl std::error::Error for TimeParseError {}
