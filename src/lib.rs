//! # buscodec
//!
//! Rust utilities for reading **automotive network descriptions** and
//! generating bit-exact signal codecs from them.
//!
//! ## Highlights
//! - **Parsers**: recovering readers for DBC (CAN), LDF (LIN) and NCF (LIN node capability) text.
//! - **One model**: every format lowers into a SlotMap-backed [`Network`] with stable keys.
//! - **Validation**: overlapping bits, out-of-frame signals, mux consistency, bad IDs and unresolved names.
//! - **Codec plans**: per-signal byte spans for Intel and Motorola layouts, scaling with reported clamping.
//! - **Code generation**: Rust and C backends behind one [`Target`](codegen::Target) trait.
//! - **Pipeline**: [`pipeline::run`] chains every stage and returns all diagnostics.
//!
//! ```
//! use buscodec::pipeline::{Format, PipelineOptions, run};
//!
//! let dbc = "BU_: ECU\nBO_ 256 Speed: 8 ECU\n SG_ VehicleSpeed : 0|16@1+ (0.1,0) [0|6553.5] \"km/h\" Vector__XXX\n";
//! let out = run(dbc, Format::Dbc, &PipelineOptions::default());
//! assert!(!out.diagnostics.has_errors());
//! assert!(out.source("rust").unwrap().text.contains("pub struct Speed"));
//! ```

pub mod codec;
pub mod codegen;
pub mod core;
#[cfg(feature = "dbc")]
pub mod dbc;
#[cfg(feature = "ldf")]
pub mod ldf;
#[cfg(feature = "ncf")]
pub mod ncf;
pub mod normalize;
pub mod pipeline;
pub mod types;
pub mod validate;

// Top-level re-exports
#[doc(inline)]
pub use crate::types::{
    diagnostics::{Diagnostic, Diagnostics, Severity},
    errors::{GenerationError, LexError, ParseError, PlanError, ReferenceError},
    message::{IdFormat, Message},
    network::{BusType, MessageKey, Network, NodeKey, SignalKey},
    node::Node,
    signal::{ByteOrder, MuxInfo, MuxRole, MuxSelector, Signal, ValueType},
};

pub use crate::codec::{CodecPlan, MessagePlan, plan, plan_message};
pub use crate::normalize::{IntoNetwork, normalize};
pub use crate::validate::{Violation, validate};
