//! NCF syntax tree: one capability description per `node` block.

use crate::core::lexer::Position;
use crate::ldf::ast::EncodingTypeDef;
use crate::types::signal::InitValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NcfFile {
    pub language_version: String,
    pub nodes: Vec<NodeCapabilityDef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeCapabilityDef {
    pub name: String,
    pub general: GeneralDef,
    pub diagnostic: DiagnosticDef,
    pub frames: Vec<NcfFrameDef>,
    pub encodings: Vec<EncodingTypeDef>,
    pub response_error: Option<String>,
    pub fault_state_signals: Vec<String>,
    pub free_text: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneralDef {
    pub protocol_version: Option<String>,
    pub supplier: Option<u16>,
    pub function: Option<u16>,
    pub variant: Option<u8>,
    pub bitrate: Option<Bitrate>,
    pub sends_wake_up_signal: Option<bool>,
}

/// `bitrate = ...;` in kbit/s.
#[derive(Debug, Clone, PartialEq)]
pub enum Bitrate {
    Fixed(f64),
    Automatic { min: Option<f64>, max: Option<f64> },
    Select(Vec<f64>),
}

impl Bitrate {
    /// Highest rate the node accepts, when stated.
    pub fn max_kbps(&self) -> Option<f64> {
        match self {
            Bitrate::Fixed(rate) => Some(*rate),
            Bitrate::Automatic { max, .. } => *max,
            Bitrate::Select(rates) => rates.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticDef {
    /// `NAD = 1, 2, 3;` or `NAD = 1 to 3;`, expanded.
    pub nad: Vec<u8>,
    pub diagnostic_class: Option<u8>,
    pub p2_min_ms: Option<f64>,
    pub st_min_ms: Option<f64>,
    pub supported_sids: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Publish,
    Subscribe,
}

/// `publish|subscribe <name> { length = ..; ...; signals { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct NcfFrameDef {
    pub direction: Direction,
    pub name: String,
    pub length: Option<u16>,
    pub min_period_ms: Option<f64>,
    pub max_period_ms: Option<f64>,
    pub message_id: Option<u32>,
    pub signals: Vec<NcfSignalDef>,
    pub pos: Position,
}

/// `<name> { size = ..; init_value = ..; offset = ..; [<encoding>;] }`
#[derive(Debug, Clone, PartialEq)]
pub struct NcfSignalDef {
    pub name: String,
    pub size: u16,
    pub init: InitValue,
    pub offset: u16,
    pub encoding: Option<String>,
    pub pos: Position,
}
