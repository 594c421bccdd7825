use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{
    attributes::AttributeValue,
    network::{MessageKey, NodeKey, SignalKey},
};

/// Definition of a signal within a message or LIN frame.
///
/// Describes position/width, byte order, value representation, scaling
/// (scale/offset), valid physical range, unit, value descriptions, receivers
/// and multiplexing role.
#[derive(Default, Clone, PartialEq, Debug, Serialize)]
pub struct Signal {
    /// Parent message key.
    pub message: MessageKey,
    /// Signal name.
    pub name: String,
    /// Start bit as declared by the source format.
    ///
    /// Little-endian: position of the least significant bit (`byte * 8 + bit`).
    /// Big-endian: position of the most significant bit in DBC sawtooth numbering.
    pub start_bit: u16,
    /// Bit width.
    pub width: u16,
    /// Byte order. `None` when the source left it unspecified and no default applies.
    pub byte_order: Option<ByteOrder>,
    /// Raw value representation.
    pub value_type: ValueType,
    /// physical = raw * scale + offset
    pub scale: f64,
    pub offset: f64,
    /// Minimum physical value.
    pub min: f64,
    /// Maximum physical value.
    pub max: f64,
    pub unit: String,
    /// Receiver nodes.
    pub receivers: Vec<NodeKey>,
    /// Multiplexing metadata.
    pub mux: MuxInfo,
    /// Associated comment (DBC `CM_ SG_`).
    pub comment: String,
    /// Raw value to text mapping (DBC `VAL_`, LIN logical values).
    pub value_descriptions: BTreeMap<i64, String>,
    /// Initial value (LIN).
    pub init_value: Option<InitValue>,
    /// Name of the LIN signal encoding type, when one is attached.
    pub encoding: Option<String>,

    // --- Signal Attribute Entry ---
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Signal {
    /// Creates an unscaled (scale 1, offset 0) unsigned signal.
    pub fn new(name: impl Into<String>, start_bit: u16, width: u16, byte_order: ByteOrder) -> Self {
        Signal {
            name: name.into(),
            start_bit,
            width,
            byte_order: Some(byte_order),
            scale: 1.0,
            ..Default::default()
        }
    }

    pub fn is_signed(&self) -> bool {
        self.value_type == ValueType::Signed
    }

    pub fn is_float(&self) -> bool {
        matches!(self.value_type, ValueType::Float32 | ValueType::Float64)
    }

    pub fn raw_to_physical(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// Byte order of a signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ByteOrder {
    /// Intel, DBC `@1`, LIN.
    LittleEndian,
    /// Motorola, DBC `@0`.
    BigEndian,
}

/// Raw value representation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    #[default]
    Unsigned,
    /// Two's complement.
    Signed,
    /// IEEE 754 single precision (DBC `SIG_VALTYPE_ 1`).
    Float32,
    /// IEEE 754 double precision (DBC `SIG_VALTYPE_ 2`).
    Float64,
}

impl ValueType {
    /// Width a float representation requires.
    pub fn float_width(self) -> Option<u16> {
        match self {
            ValueType::Float32 => Some(32),
            ValueType::Float64 => Some(64),
            _ => None,
        }
    }
}

/// What role (if any) a signal plays in multiplexing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MuxRole {
    /// Not multiplexed (always present).
    #[default]
    None,
    /// This signal is the multiplexer switch (`M` in DBC).
    Multiplexor,
    /// This signal is gated by a multiplexer value (`mX`).
    Multiplexed,
    /// Gated by a switch and itself a switch for other signals (`mXM`).
    MultiplexedMultiplexor,
}

impl MuxRole {
    pub fn is_switch(self) -> bool {
        matches!(self, MuxRole::Multiplexor | MuxRole::MultiplexedMultiplexor)
    }

    pub fn is_gated(self) -> bool {
        matches!(self, MuxRole::Multiplexed | MuxRole::MultiplexedMultiplexor)
    }
}

/// A selector for multiplexed signals: either a single value or a closed range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MuxSelector {
    /// Active only when the switch == value.
    Value(u64),
    /// Active only when min <= switch <= max.
    Range { min: u64, max: u64 },
}

impl MuxSelector {
    pub fn contains(&self, switch: u64) -> bool {
        match *self {
            MuxSelector::Value(v) => v == switch,
            MuxSelector::Range { min, max } => (min..=max).contains(&switch),
        }
    }

    pub fn bounds(&self) -> (u64, u64) {
        match *self {
            MuxSelector::Value(v) => (v, v),
            MuxSelector::Range { min, max } => (min, max),
        }
    }

    pub fn intersects(&self, other: &MuxSelector) -> bool {
        let (a_min, a_max) = self.bounds();
        let (b_min, b_max) = other.bounds();
        a_min <= b_max && b_min <= a_max
    }
}

/// Multiplexing metadata attached to a signal.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MuxInfo {
    /// Role of this signal in multiplexing.
    pub role: MuxRole,
    /// For gated signals, the switch controlling it. `None` otherwise or when unresolved.
    pub switch: Option<SignalKey>,
    /// For gated signals, the activating selectors. Empty otherwise.
    pub selectors: Vec<MuxSelector>,
}

impl MuxInfo {
    /// True when any selector of `self` can be active together with one of `other`.
    pub fn selectors_intersect(&self, other: &MuxInfo) -> bool {
        self.selectors
            .iter()
            .any(|a| other.selectors.iter().any(|b| a.intersects(b)))
    }
}

/// Initial value of a LIN signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum InitValue {
    Scalar(u64),
    /// Byte array signal initial value, first byte first.
    Array(Vec<u8>),
}
