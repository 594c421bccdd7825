//! One-token lookahead over a token stream, shared by the recursive-descent
//! parsers.
//!
//! Lexical errors met while advancing are collected into the cursor's
//! diagnostics and the offending input is skipped, so the grammar code only
//! ever sees well-formed tokens.

use crate::core::lexer::{Position, Token, TokenKind};
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::{LexError, ParseError};

/// A parsed syntax tree together with everything collected while parsing it.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub ast: T,
    pub diagnostics: Diagnostics,
}

pub struct TokenCursor<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    tokens: I,
    current: Token,
    /// Line of the last consumed token; 0 before the first one.
    last_line: u32,
    pub diagnostics: Diagnostics,
}

impl<I> TokenCursor<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub fn new(tokens: impl IntoIterator<IntoIter = I>) -> Self {
        let mut cursor = TokenCursor {
            tokens: tokens.into_iter(),
            current: Token {
                kind: TokenKind::Eof,
                text: String::new(),
                pos: Position::new(1, 1),
            },
            last_line: 0,
            diagnostics: Diagnostics::new(),
        };
        cursor.current = cursor.pull(Position::new(1, 1));
        cursor
    }

    fn pull(&mut self, fallback: Position) -> Token {
        loop {
            match self.tokens.next() {
                Some(Ok(token)) => return token,
                Some(Err(e)) => self.diagnostics.push(e),
                None => {
                    return Token {
                        kind: TokenKind::Eof,
                        text: String::new(),
                        pos: fallback,
                    };
                }
            }
        }
    }

    pub fn peek(&self) -> &Token {
        &self.current
    }

    pub fn position(&self) -> Position {
        self.current.pos
    }

    /// Consumes the lookahead token. At end of input keeps returning `Eof`.
    pub fn bump(&mut self) -> Token {
        if self.current.kind == TokenKind::Eof {
            return self.current.clone();
        }
        let fallback = self.current.pos;
        let next = self.pull(fallback);
        let token = std::mem::replace(&mut self.current, next);
        self.last_line = token.pos.line;
        token
    }

    pub fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub fn at_ident(&self, word: &str) -> bool {
        self.current.is_ident(word)
    }

    pub fn at_eof(&self) -> bool {
        self.at(TokenKind::Eof)
    }

    /// True when the lookahead is the first token of its line.
    pub fn at_line_start(&self) -> bool {
        self.current.pos.line > self.last_line
    }

    pub fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    pub fn eat_ident(&mut self, word: &str) -> bool {
        if self.at_ident(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Error describing the lookahead as unexpected.
    pub fn error(&self, expected: impl Into<String>) -> ParseError {
        ParseError::new(self.current.pos, expected, self.current.describe())
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error(kind.describe()))
        }
    }

    pub fn expect_ident(&mut self, word: &str) -> Result<Token, ParseError> {
        if self.at_ident(word) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("'{word}'")))
        }
    }

    pub fn ident(&mut self) -> Result<String, ParseError> {
        Ok(self.expect(TokenKind::Ident)?.text)
    }

    pub fn string(&mut self) -> Result<String, ParseError> {
        Ok(self.expect(TokenKind::Str)?.text)
    }

    /// Non-negative integer literal (decimal or hexadecimal).
    pub fn uint(&mut self) -> Result<u64, ParseError> {
        let token = self.expect(TokenKind::Int)?;
        token
            .as_u64()
            .ok_or_else(|| ParseError::new(token.pos, "integer", token.describe()))
    }

    /// Integer literal with an optional leading `-`.
    pub fn int(&mut self) -> Result<i64, ParseError> {
        let negative = self.eat(TokenKind::Minus).is_some();
        let pos = self.position();
        let value = self.uint()?;
        let value = i64::try_from(value)
            .map_err(|_| ParseError::new(pos, "64-bit signed integer", value.to_string()))?;
        Ok(if negative { -value } else { value })
    }

    /// Integer or decimal literal with an optional sign.
    pub fn number(&mut self) -> Result<f64, ParseError> {
        let negative = self.eat(TokenKind::Minus).is_some();
        if !negative {
            self.eat(TokenKind::Plus);
        }
        let value = match self.current.kind {
            TokenKind::Int | TokenKind::Float => {
                let token = self.bump();
                token
                    .as_f64()
                    .ok_or_else(|| ParseError::new(token.pos, "number", token.describe()))?
            }
            _ => return Err(self.error("number")),
        };
        Ok(if negative { -value } else { value })
    }

    /// Skips tokens up to and including the next `kind` (or end of input).
    pub fn skip_past(&mut self, kind: TokenKind) {
        while !self.at_eof() {
            if self.bump().kind == kind {
                return;
            }
        }
    }

    /// Skips tokens until `stop` holds for the lookahead (or end of input).
    pub fn skip_until(&mut self, mut stop: impl FnMut(&Self) -> bool) {
        while !self.at_eof() && !stop(self) {
            self.bump();
        }
    }
}
