//! # dbc
//!
//! `dbc` is the module to work with .dbc files: a recovering parser producing
//! a [`DbcFile`] syntax tree, its lowering into the shared
//! [`Network`](crate::types::network::Network), and a writer rendering a
//! network back into DBC text.
//!
//! # Example
//! ```
//! use buscodec::dbc;
//! use buscodec::normalize::normalize;
//!
//! let text = "BU_: ECU\nBO_ 256 Engine: 8 ECU\n SG_ Rpm : 0|16@1+ (0.25,0) [0|16383.75] \"rpm\" Vector__XXX\n";
//! let parsed = dbc::parse_str(text).unwrap();
//! let mut diagnostics = parsed.diagnostics;
//! let network = normalize(&parsed.ast, &mut diagnostics);
//! assert!(diagnostics.is_empty());
//! assert_eq!(network.get_signal_by_name("Engine", "Rpm").unwrap().scale, 0.25);
//! ```

pub mod ast;
pub mod normalize;
pub mod parse;
pub mod write;

pub use ast::DbcFile;
pub use parse::{parse, parse_str};
pub use write::to_dbc_string;
