//! # core
//!
//! Building blocks shared by the format readers and the codec: tokenizer,
//! token cursor, text helpers and bit layout.

pub mod cursor;
pub mod layout;
pub mod lexer;
pub mod strings;
