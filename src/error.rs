//! Error types for the two failure domains that reach the caller: syntax
//! errors (mini-notation and scripts) and evaluation errors in the
//! expression compiler.
//!
//! Query-time problems are not errors: combinators given unusable
//! parameters degrade to silence instead.

use crate::event::Location;
use thiserror::Error;

/// A syntax error in mini-notation or script text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Character offset into the text that was being parsed.
    pub offset: usize,
    /// Location of the enclosing script fragment, when there is one.
    pub location: Option<Location>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Offset of the error within the enclosing script, if known.
    pub fn absolute_offset(&self) -> usize {
        match self.location {
            Some(origin) => origin.start + self.offset,
            None => self.offset,
        }
    }
}

/// Errors raised while turning an expression into a pattern.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("'{name}': {message}")]
    Type { name: String, message: String },
    #[error("cannot evaluate an empty form")]
    EmptyForm,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl EvalError {
    pub fn type_error(name: &str, message: impl Into<String>) -> Self {
        EvalError::Type {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unclosed '['", 4);
        assert_eq!(err.to_string(), "unclosed '[' at offset 4");
    }

    #[test]
    fn test_absolute_offset() {
        let err = ParseError::new("bad", 3).with_location(Some(Location::new(10, 20)));
        assert_eq!(err.absolute_offset(), 13);
    }

    #[test]
    fn test_parse_error_converts() {
        let err: EvalError = ParseError::new("bad", 0).into();
        assert!(matches!(err, EvalError::Parse(_)));
    }
}
