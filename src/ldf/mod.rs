//! # ldf
//!
//! LIN description files: a block-structured parser producing an
//! [`LdfFile`] and its lowering into the shared
//! [`Network`](crate::types::network::Network) (frames, diagnostic frames,
//! node attributes, schedule tables and signal encodings).
//!
//! # Example
//! ```
//! use buscodec::ldf;
//! use buscodec::normalize::normalize;
//!
//! let text = r#"
//! LIN_description_file;
//! LIN_protocol_version = "2.1";
//! LIN_language_version = "2.1";
//! LIN_speed = 19.2 kbps;
//! Nodes { Master: M, 5 ms, 0 ms; Slaves: S; }
//! Signals { Level: 8, 0, S, M; }
//! Frames { Status: 0x20, S, 1 { Level, 0; } }
//! "#;
//! let parsed = ldf::parse_str(text).unwrap();
//! let mut diagnostics = parsed.diagnostics;
//! let network = normalize(&parsed.ast, &mut diagnostics);
//! assert!(diagnostics.is_empty());
//! assert_eq!(network.get_message_by_name("Status").unwrap().id, 0x20);
//! ```

pub mod ast;
pub mod normalize;
pub mod parse;

pub use ast::LdfFile;
pub use parse::{parse, parse_str};
