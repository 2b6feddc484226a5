//! Error types for schema extraction

use std::fmt;
use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where a failing child sits inside its composite parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Declared sub-field of a structured field
    Name(String),
    /// Item of a list (or dict item before its key is known)
    Index(usize),
    /// Key field of a dict entry
    Key(usize),
    /// Dict item whose key already resolved
    Item(String),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Name(name) => write!(f, "\"{}\"", name),
            Position::Index(index) => write!(f, "item {}", index),
            Position::Key(index) => write!(f, "key {}", index),
            Position::Item(key) => write!(f, "item \"{}\"", key),
        }
    }
}

/// Errors raised while declaring, parsing or reading a schema
#[derive(Debug, Error)]
pub enum Error {
    /// Selector expression could not be compiled
    #[error("invalid selector \"{selector}\": {message}")]
    InvalidSelector { selector: String, message: String },

    /// A required selector matched nothing
    #[error("could not find selector \"{selector}\" starting from {context}")]
    SelectorNotFound { selector: String, context: String },

    /// A narrowing step produced nothing usable (no text, no element, no URL)
    #[error("could not find any {what} for source \"{origin}\" starting from {context}")]
    Missing {
        what: &'static str,
        origin: String,
        context: String,
    },

    /// Text could not be converted to the target scalar type
    #[error("could not convert \"{text}\" to {target} for source \"{origin}\" starting from {context}")]
    Conversion {
        text: String,
        target: String,
        origin: String,
        context: String,
    },

    /// A sub-field or item of a composite failed
    #[error("failed to parse {position} for selector \"{selector}\": {source}")]
    Child {
        position: Position,
        selector: String,
        #[source]
        source: Box<Error>,
    },

    /// A dict key resolved to a value that cannot be used as a key
    #[error("cannot use {key} as a key for selector \"{selector}\"")]
    InvalidKey { key: String, selector: String },

    /// Raised by a user hook
    #[error("hook failed: {0}")]
    Hook(String),

    /// The schema declaration itself is wrong
    #[error("invalid schema: {0}")]
    Config(String),

    /// Definition axis: no template with that name
    #[error("{container} has no subfield \"{name}\"")]
    NoSuchSubfield { container: String, name: String },

    /// Value/field axis: no child under that key
    #[error("{container} has no key \"{key}\"")]
    NoSuchKey { container: String, key: String },

    /// Value/field axis: index out of range
    #[error("{container} has no item {index}")]
    NoSuchIndex { container: String, index: usize },

    /// Value/field axis on a field that has no children
    #[error("{container} does not contain fields")]
    NotAContainer { container: String },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for hooks that want to fail with a message
    pub fn hook(message: impl Into<String>) -> Self {
        Error::Hook(message.into())
    }

    /// Innermost error of a chain of composite failures
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Child { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
