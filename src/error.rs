use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading EDN text. Positions are byte offsets into the input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("empty input")]
    EmptyInput,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid escape sequence '\\{escape}' at position {position}")]
    InvalidEscape { escape: String, position: usize },

    #[error("invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },

    #[error("invalid character literal '\\{text}' at position {position}")]
    InvalidChar { text: String, position: usize },

    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("map starting at position {0} has an odd number of forms")]
    OddMapEntries(usize),

    #[error("duplicate key {key} in collection starting at position {position}")]
    DuplicateKey { key: String, position: usize },

    #[error("forms nested more than {} deep at position {position}", crate::edn::MAX_DEPTH)]
    TooDeep { position: usize },

    #[error("trailing input at position {0}")]
    TrailingInput(usize),
}

/// Errors raised while turning a model document into a [`Model`](crate::Model).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("could not read {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("model document must be a map, found {0}")]
    NotAMap(String),

    #[error("missing required key :{0}")]
    MissingKey(&'static str),

    #[error("malformed :{field}: {message}")]
    Schema { field: &'static str, message: String },

    #[error(":{field} refers to undeclared identifier {id}")]
    UnknownIdentifier { field: &'static str, id: String },
}

impl ModelError {
    pub(crate) fn schema(field: &'static str, message: impl Into<String>) -> Self {
        ModelError::Schema {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
