use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{
    attributes::AttributeValue,
    network::{Network, NodeKey, SignalKey},
    signal::Signal,
};

/// Message (CAN) or frame (LIN) of the network.
///
/// Holds the numeric identifier and its format, the payload length, the
/// transmitting nodes and the ordered list of composing signals.
#[derive(Default, Clone, PartialEq, Debug, Serialize)]
pub struct Message {
    /// ID format (Standard, Extended or LIN).
    pub id_format: IdFormat,
    /// Numeric identifier without format flags.
    pub id: u32,
    /// Message name.
    pub name: String,
    /// Payload length in bytes.
    pub byte_length: u16,
    /// Transmitting nodes. The first one is the declared sender.
    pub senders: Vec<NodeKey>,
    /// Signals that belong to this message, in declaration order.
    pub signals: Vec<SignalKey>,
    /// Associated comment (DBC `CM_ BO_`).
    pub comment: String,
    /// Cycle time (DBC `GenMsgCycleTime`, NCF `max_period`).
    pub cycle_time_ms: Option<f64>,
    /// Frame kind (LIN distinguishes diagnostic frames).
    pub kind: FrameKind,
    /// Names of the schedule tables this frame appears in.
    pub schedules: Vec<String>,

    // --- Message Attribute Entry ---
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Message {
    pub fn new(name: impl Into<String>, id: u32, id_format: IdFormat, byte_length: u16) -> Self {
        Message {
            name: name.into(),
            id,
            id_format,
            byte_length,
            ..Default::default()
        }
    }

    /// Convenience iterator over the signals belonging to this message.
    pub fn signals<'a>(&'a self, network: &'a Network) -> impl Iterator<Item = &'a Signal> + 'a {
        self.signals
            .iter()
            .filter_map(move |&key| network.get_sig_by_key(key))
    }

    pub fn total_bits(&self) -> usize {
        self.byte_length as usize * 8
    }
}

#[derive(Default, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub enum IdFormat {
    /// 11-bit CAN identifier.
    #[default]
    Standard,
    /// 29-bit CAN identifier.
    Extended,
    /// 6-bit LIN frame identifier.
    Lin,
}

impl IdFormat {
    /// Largest identifier representable in this format.
    pub fn max_id(self) -> u32 {
        match self {
            IdFormat::Standard => 0x7FF,
            IdFormat::Extended => 0x1FFF_FFFF,
            IdFormat::Lin => 0x3F,
        }
    }
}

impl fmt::Display for IdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdFormat::Standard => "standard",
            IdFormat::Extended => "extended",
            IdFormat::Lin => "LIN",
        })
    }
}

#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum FrameKind {
    #[default]
    Unconditional,
    /// LIN `MasterReq` (0x3C) / `SlaveResp` (0x3D).
    Diagnostic,
}
