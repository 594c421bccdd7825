use std::fmt;
use thiserror::Error;

use crate::core::lexer::Position;

/// Errors produced while tokenizing a description file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("{position}: unterminated string literal")]
    UnterminatedString { position: Position },
    #[error("{position}: unterminated block comment")]
    UnterminatedComment { position: Position },
    #[error("{position}: invalid numeric literal '{literal}'")]
    InvalidNumber { position: Position, literal: String },
    #[error("{position}: unexpected character '{found}'")]
    UnexpectedChar { position: Position, found: char },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString { position }
            | LexError::UnterminatedComment { position }
            | LexError::InvalidNumber { position, .. }
            | LexError::UnexpectedChar { position, .. } => *position,
        }
    }
}

/// A grammar error: the parser expected something else at `position`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: expected {expected}, found {found}")]
pub struct ParseError {
    pub position: Position,
    pub expected: String,
    pub found: String,
}

impl ParseError {
    pub fn new(position: Position, expected: impl Into<String>, found: impl Into<String>) -> Self {
        ParseError {
            position,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Which kind of entity a textual reference was supposed to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Node,
    Message,
    Signal,
    Multiplexor,
    Encoding,
    ValueTable,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Node => "node",
            ReferenceKind::Message => "message",
            ReferenceKind::Signal => "signal",
            ReferenceKind::Multiplexor => "multiplexor",
            ReferenceKind::Encoding => "encoding type",
            ReferenceKind::ValueTable => "value table",
        };
        f.write_str(s)
    }
}

/// A name that could not be resolved to an entity of the network.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unresolved {kind} '{name}' referenced by {context}")]
pub struct ReferenceError {
    pub kind: ReferenceKind,
    pub name: String,
    pub context: String,
    pub position: Option<Position>,
}

impl ReferenceError {
    pub fn new(kind: ReferenceKind, name: impl Into<String>, context: impl Into<String>) -> Self {
        ReferenceError {
            kind,
            name: name.into(),
            context: context.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// Why a codec plan could not be computed for a signal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanFailure {
    #[error("bit width {width} is outside 1..=64")]
    WidthOutOfRange { width: u16 },
    #[error("float signal must be {expected} bits wide, found {width}")]
    FloatWidth { width: u16, expected: u16 },
    #[error("byte order is unspecified and the format has no default")]
    UnspecifiedByteOrder,
    #[error("bit {bit} lies outside the {total_bits}-bit frame")]
    OutOfFrame { bit: i64, total_bits: usize },
    #[error("multiplexor of the signal does not exist")]
    MissingMultiplexor,
    #[error("message does not exist")]
    UnknownMessage,
}

/// Fatal for the codec of one message: that message is left out of generation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot plan signal '{signal}' of message '{message}': {reason}")]
pub struct PlanError {
    pub message: String,
    pub signal: String,
    pub reason: PlanFailure,
}

/// Fatal for one generation target.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("target '{target}' cannot represent {width}-bit signal '{signal}' of message '{message}'")]
    UnsupportedWidth {
        target: &'static str,
        message: String,
        signal: String,
        width: u16,
    },
    #[error("target '{target}' has no {kind} type")]
    UnsupportedKind {
        target: &'static str,
        kind: &'static str,
    },
}
