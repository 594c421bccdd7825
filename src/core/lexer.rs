//! Tokenizer shared by the DBC, LDF and NCF parsers.
//!
//! The three formats have compatible lexical structure: identifiers, decimal and
//! hexadecimal numbers, double-quoted strings, `//` and `/* */` comments and a
//! small set of punctuation characters. The lexer is a lazy iterator; creating a
//! new one over the same text restarts the stream.
//!
//! A lexical error does not stop the iterator: the error is yielded at the
//! position of the offending input and scanning resumes right after it, so one
//! pass reports every lexical problem of a file.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::types::errors::LexError;

/// 1-based line/column position inside the source text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier or keyword (`BO_`, `Frames`, `Vector__XXX`, ...).
    Ident,
    /// Integer literal, decimal or `0x` hexadecimal.
    Int,
    /// Decimal literal with fraction and/or exponent.
    Float,
    /// Double-quoted string; the token text holds the unescaped content.
    Str,
    Colon,
    Semicolon,
    Comma,
    Pipe,
    At,
    Plus,
    Minus,
    Equals,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// End of input. Emitted exactly once.
    Eof,
}

impl TokenKind {
    /// Human-readable description used in parse diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "number",
            TokenKind::Str => "string",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::Pipe => "'|'",
            TokenKind::At => "'@'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Equals => "'='",
            TokenKind::Percent => "'%'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Eof => "end of file",
        }
    }
}

/// A token produced by the lexer.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text. For strings, the unescaped content without quotes.
    pub text: String,
    pub pos: Position,
}

impl Token {
    /// Integer value of an `Int` token (decimal or `0x` hexadecimal).
    pub fn as_u64(&self) -> Option<u64> {
        if self.kind != TokenKind::Int {
            return None;
        }
        parse_int_literal(&self.text)
    }

    /// Numeric value of an `Int` or `Float` token.
    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            TokenKind::Int => parse_int_literal(&self.text).map(|v| v as f64),
            TokenKind::Float => self.text.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }

    /// Short rendering for "found ..." in diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Ident | TokenKind::Int | TokenKind::Float => format!("'{}'", self.text),
            TokenKind::Str => format!("string \"{}\"", self.text),
            other => other.describe().to_string(),
        }
    }
}

fn parse_int_literal(text: &str) -> Option<u64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u64>().ok()
    }
}

/// Lazily tokenizes `text`.
pub fn tokenize(text: &str) -> Lexer<'_> {
    Lexer::new(text)
}

/// Iterator over the tokens of a source text.
#[derive(Clone)]
pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            finished: false,
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Skips whitespace and comments. Returns an error for an unclosed block comment.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let start = self.here();
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek().map(|&(_, c)| c) {
                        Some('/') => {
                            while let Some(c) = self.peek_char() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            self.advance();
                            self.advance();
                            let mut prev = '\0';
                            let mut closed = false;
                            while let Some(c) = self.advance() {
                                if prev == '*' && c == '/' {
                                    closed = true;
                                    break;
                                }
                                prev = c;
                            }
                            if !closed {
                                return Err(LexError::UnterminatedComment { position: start });
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn single(&mut self, kind: TokenKind, pos: Position) -> Token {
        let ch = self.advance().unwrap_or_default();
        Token {
            kind,
            text: ch.to_string(),
            pos,
        }
    }

    fn read_while(&mut self, text: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
    }

    fn read_identifier(&mut self, pos: Position) -> Token {
        let mut text = String::new();
        self.read_while(&mut text, |c| c.is_alphanumeric() || c == '_');
        Token {
            kind: TokenKind::Ident,
            text,
            pos,
        }
    }

    fn read_string(&mut self, pos: Position) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(LexError::UnterminatedString { position: pos }),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    None => return Err(LexError::UnterminatedString { position: pos }),
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str,
            text,
            pos,
        })
    }

    fn read_number(&mut self, pos: Position) -> Result<Token, LexError> {
        let mut text = String::new();
        let mut kind = TokenKind::Int;
        let mut valid = true;

        self.read_while(&mut text, |c| c.is_ascii_digit());

        if text == "0" && matches!(self.peek_char(), Some('x') | Some('X')) {
            if let Some(x) = self.advance() {
                text.push(x);
            }
            let before = text.len();
            self.read_while(&mut text, |c| c.is_ascii_hexdigit());
            valid = text.len() > before;
        } else {
            if self.peek_char() == Some('.') {
                kind = TokenKind::Float;
                text.push('.');
                self.advance();
                self.read_while(&mut text, |c| c.is_ascii_digit());
            }
            if matches!(self.peek_char(), Some('e') | Some('E')) {
                kind = TokenKind::Float;
                if let Some(e) = self.advance() {
                    text.push(e);
                }
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    text.push(sign);
                    self.advance();
                }
                let before = text.len();
                self.read_while(&mut text, |c| c.is_ascii_digit());
                valid = text.len() > before;
            }
        }

        // A literal glued to letters ("12ab", "0x1G", "1.5.2") is malformed.
        if matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.') {
            valid = false;
            self.read_while(&mut text, |c| c.is_alphanumeric() || c == '_' || c == '.');
        }

        if !valid {
            return Err(LexError::InvalidNumber {
                position: pos,
                literal: text,
            });
        }
        Ok(Token { kind, text, pos })
    }

    fn scan(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let pos = self.here();
        let Some(ch) = self.peek_char() else {
            self.finished = true;
            return Ok(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                pos,
            });
        };

        let token = match ch {
            ':' => self.single(TokenKind::Colon, pos),
            ';' => self.single(TokenKind::Semicolon, pos),
            ',' => self.single(TokenKind::Comma, pos),
            '|' => self.single(TokenKind::Pipe, pos),
            '@' => self.single(TokenKind::At, pos),
            '+' => self.single(TokenKind::Plus, pos),
            '-' => self.single(TokenKind::Minus, pos),
            '=' => self.single(TokenKind::Equals, pos),
            '%' => self.single(TokenKind::Percent, pos),
            '(' => self.single(TokenKind::LParen, pos),
            ')' => self.single(TokenKind::RParen, pos),
            '[' => self.single(TokenKind::LBracket, pos),
            ']' => self.single(TokenKind::RBracket, pos),
            '{' => self.single(TokenKind::LBrace, pos),
            '}' => self.single(TokenKind::RBrace, pos),
            '"' => self.read_string(pos)?,
            c if c.is_ascii_digit() => self.read_number(pos)?,
            c if c.is_alphabetic() || c == '_' => self.read_identifier(pos),
            other => {
                self.advance();
                return Err(LexError::UnexpectedChar {
                    position: pos,
                    found: other,
                });
            }
        };
        Ok(token)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.scan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text)
            .filter_map(Result::ok)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_signal_line() {
        let toks: Vec<Token> = tokenize(r#"SG_ Speed : 0|16@1+ (0.1,-40) [0|6513.5] "km/h" ABS"#)
            .collect::<Result<_, _>>()
            .unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "SG_", "Speed", ":", "0", "|", "16", "@", "1", "+", "(", "0.1", ",", "-", "40",
                ")", "[", "0", "|", "6513.5", "]", "km/h", "ABS", ""
            ]
        );
        assert_eq!(toks[10].kind, TokenKind::Float);
        assert_eq!(toks[20].kind, TokenKind::Str);
        assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_positions() {
        let toks: Vec<Token> = tokenize("BU_: A\n  B")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(toks[0].pos, Position::new(1, 1));
        assert_eq!(toks[2].pos, Position::new(1, 6));
        assert_eq!(toks[3].pos, Position::new(2, 3));
    }

    #[test]
    fn test_numbers() {
        let toks: Vec<Token> = tokenize("0x3C 1E-005 19.2 42")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(toks[0].as_u64(), Some(0x3C));
        assert_eq!(toks[1].kind, TokenKind::Float);
        assert_eq!(toks[1].as_f64(), Some(1e-5));
        assert_eq!(toks[2].as_f64(), Some(19.2));
        assert_eq!(toks[3].as_u64(), Some(42));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// line\nA /* block\n comment */ ;"),
            vec![TokenKind::Ident, TokenKind::Semicolon, TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_escapes_and_multiline() {
        let toks: Vec<Token> = tokenize("\"a \\\"quoted\\\"\nline\"")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(toks[0].text, "a \"quoted\"\nline");
    }

    #[test]
    fn test_errors_are_reported_and_scanning_resumes() {
        let items: Vec<Result<Token, LexError>> = tokenize("A $ 12ab B \"open").collect();
        let errors: Vec<&LexError> = items.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[0],
            &LexError::UnexpectedChar {
                position: Position::new(1, 3),
                found: '$'
            }
        );
        assert!(matches!(errors[1], LexError::InvalidNumber { literal, .. } if literal == "12ab"));
        assert!(matches!(errors[2], LexError::UnterminatedString { .. }));
        let idents: Vec<String> = items
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text.clone())
            .collect();
        assert_eq!(idents, vec!["A", "B"]);
    }

    #[test]
    fn test_restartable() {
        let text = "BO_ 256 Msg: 8 ECU";
        let first: Vec<_> = tokenize(text).collect();
        let second: Vec<_> = tokenize(text).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let items: Vec<_> = tokenize("A /* never closed").collect();
        assert!(matches!(
            items[1],
            Err(LexError::UnterminatedComment { .. })
        ));
    }
}
