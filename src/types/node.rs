use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{
    attributes::AttributeValue,
    network::{MessageKey, SignalKey},
};

/// Node/ECU of the network.
#[derive(Default, Clone, PartialEq, Debug, Serialize)]
pub struct Node {
    /// Node/ECU name.
    pub name: String,
    /// Associated comment
    pub comment: String,
    /// Messages transmitted by this node.
    pub messages_sent: Vec<MessageKey>,
    /// Messages with at least one signal received by this node.
    pub messages_received: Vec<MessageKey>,
    /// LIN node attributes (`Node_attributes` in LDF, `general`/`diagnostic` in NCF).
    pub lin: Option<LinNodeAttributes>,

    // --- Attributes ---
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// LIN product identification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProductId {
    pub supplier_id: u16,
    pub function_id: u16,
    pub variant: Option<u8>,
}

/// A frame the master may reassign at run time.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConfigurableFrame {
    pub name: String,
    /// Message ID (LIN 2.0 style) when given.
    pub message_id: Option<u32>,
    pub frame: Option<MessageKey>,
}

/// Configuration of a LIN slave node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinNodeAttributes {
    pub protocol_version: Option<String>,
    pub configured_nad: Option<u8>,
    pub initial_nad: Option<u8>,
    /// NAD values accepted by the node (NCF `NAD = 1, 2` or `NAD = 1 to 8`).
    pub nad_set: Vec<u8>,
    pub product_id: Option<ProductId>,
    pub response_error: Option<SignalKey>,
    pub fault_state_signals: Vec<SignalKey>,
    pub p2_min_ms: Option<f64>,
    pub st_min_ms: Option<f64>,
    pub n_as_timeout_ms: Option<f64>,
    pub n_cr_timeout_ms: Option<f64>,
    pub configurable_frames: Vec<ConfigurableFrame>,
    /// NCF only.
    pub bitrate_bps: Option<f64>,
    pub sends_wake_up_signal: Option<bool>,
    pub diagnostic_class: Option<u8>,
    pub supported_sids: Vec<u8>,
    pub free_text: Option<String>,
}
