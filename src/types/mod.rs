//! # types
//!
//! The shared intermediate representation ([`network::Network`] and its
//! entities) plus the error and diagnostic types used by every stage.

pub mod attributes;
pub mod diagnostics;
pub mod errors;
pub mod lin;
pub mod message;
pub mod network;
pub mod node;
pub mod schedule;
pub mod signal;
