//! Diagnostic collection.
//!
//! Every stage receives a `&mut Diagnostics` and appends what it finds; the
//! caller merges and presents them. Nothing is stored in global state.

use thiserror::Error;

use crate::core::lexer::Position;
use crate::types::errors::{GenerationError, LexError, ParseError, PlanError, ReferenceError};
use crate::validate::Violation;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// Non-fatal remark (skipped section, unexpected protocol version, ...).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}warning: {message}", position_prefix(.position))]
pub struct Warning {
    pub position: Option<Position>,
    pub message: String,
}

fn position_prefix(position: &Option<Position>) -> String {
    position.map(|p| format!("{p}: ")).unwrap_or_default()
}

/// One entry of the diagnostic report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Diagnostic {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Violation(#[from] Violation),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Warning(#[from] Warning),
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::Warning(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Source position, when the diagnostic refers to the input text.
    pub fn position(&self) -> Option<Position> {
        match self {
            Diagnostic::Lex(e) => Some(e.position()),
            Diagnostic::Parse(e) => Some(e.position),
            Diagnostic::Reference(e) => e.position,
            Diagnostic::Warning(w) => w.position,
            Diagnostic::Violation(_) | Diagnostic::Plan(_) | Diagnostic::Generation(_) => None,
        }
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.items.push(diagnostic.into());
    }

    pub fn warn(&mut self, position: Option<Position>, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}{}", position_prefix(&position), message);
        self.items.push(Diagnostic::Warning(Warning { position, message }));
    }

    /// Appends everything collected by another stage.
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items
            .iter()
            .filter(|d| d.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }

    pub fn reference_errors(&self) -> impl Iterator<Item = &ReferenceError> + '_ {
        self.items.iter().filter_map(|d| match d {
            Diagnostic::Reference(e) => Some(e),
            Diagnostic::Violation(Violation::UnresolvedReference(e)) => Some(e),
            _ => None,
        })
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_and_merge() {
        let mut first = Diagnostics::new();
        first.push(ParseError::new(Position::new(3, 1), "';'", "'BO_'"));
        let mut second = Diagnostics::new();
        second.warn(None, "unknown section skipped");
        first.merge(second);

        assert_eq!(first.len(), 2);
        assert!(first.has_errors());
        assert_eq!(first.errors().count(), 1);
        assert_eq!(first.warnings().count(), 1);
        assert_eq!(
            first.iter().next().and_then(Diagnostic::position),
            Some(Position::new(3, 1))
        );
        assert_eq!(
            first.iter().next().map(|d| d.to_string()).unwrap_or_default(),
            "3:1: expected ';', found 'BO_'"
        );
    }

    #[test]
    fn test_warnings_only_is_not_an_error() {
        let mut d = Diagnostics::new();
        d.warn(Some(Position::new(1, 1)), "protocol version \"1.3\" is not a LIN 2.x version");
        assert!(!d.has_errors());
        assert_eq!(
            d.iter().next().map(|d| d.to_string()).unwrap_or_default(),
            "1:1: warning: protocol version \"1.3\" is not a LIN 2.x version"
        );
    }
}
