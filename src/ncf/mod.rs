//! # ncf
//!
//! LIN node capability files. The parser shares the LDF block grammar; the
//! normalizer turns each described node into a slave of a LIN network with
//! its published and subscribed frames.

pub mod ast;
pub mod normalize;
pub mod parse;

pub use ast::NcfFile;
pub use parse::{parse, parse_str};
