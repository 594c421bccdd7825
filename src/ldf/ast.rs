//! LDF syntax tree. Names are kept as written; the normalizer resolves them.

use crate::core::lexer::Position;
use crate::types::lin::EncodingValue;
use crate::types::node::ProductId;
use crate::types::schedule::ScheduleEntry;
use crate::types::signal::InitValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LdfFile {
    pub protocol_version: String,
    pub language_version: String,
    pub speed_kbps: f64,
    pub channel_name: Option<String>,
    pub master: Option<MasterDef>,
    pub slaves: Vec<String>,
    pub signals: Vec<SignalDef>,
    pub diagnostic_signals: Vec<SignalDef>,
    pub frames: Vec<FrameDef>,
    pub sporadic_frames: Vec<SporadicFrameDef>,
    pub event_triggered_frames: Vec<EventTriggeredFrameDef>,
    pub diagnostic_frames: Vec<FrameDef>,
    pub node_attributes: Vec<NodeAttributesDef>,
    pub schedule_tables: Vec<ScheduleTableDef>,
    pub encoding_types: Vec<EncodingTypeDef>,
    pub representations: Vec<RepresentationDef>,
}

/// `Master: <name>, <time base> ms, <jitter> ms;` (`Commander` in LIN 2.2A+).
#[derive(Debug, Clone, PartialEq)]
pub struct MasterDef {
    pub name: String,
    pub time_base_ms: f64,
    pub jitter_ms: f64,
    pub pos: Position,
}

/// `<name>: <size>, <init>, <publisher>, <subscriber>... ;`
///
/// Diagnostic signals carry no publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDef {
    pub name: String,
    pub width: u16,
    pub init: InitValue,
    pub publisher: Option<String>,
    pub subscribers: Vec<String>,
    pub pos: Position,
}

/// `<name>: <id>, <publisher>, <length> { <signal>, <offset>; ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDef {
    pub name: String,
    pub id: u32,
    /// `None` for diagnostic frames.
    pub publisher: Option<String>,
    pub length: u16,
    pub signals: Vec<FrameSignalDef>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSignalDef {
    pub name: String,
    pub offset: u16,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SporadicFrameDef {
    pub name: String,
    pub frames: Vec<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventTriggeredFrameDef {
    pub name: String,
    pub collision_schedule: Option<String>,
    pub id: u32,
    pub frames: Vec<String>,
    pub pos: Position,
}

/// One node block of `Node_attributes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttributesDef {
    pub node: String,
    pub protocol: Option<String>,
    pub configured_nad: Option<u8>,
    pub initial_nad: Option<u8>,
    pub product_id: Option<ProductId>,
    pub response_error: Option<String>,
    pub fault_state_signals: Vec<String>,
    pub p2_min_ms: Option<f64>,
    pub st_min_ms: Option<f64>,
    pub n_as_timeout_ms: Option<f64>,
    pub n_cr_timeout_ms: Option<f64>,
    /// Frame name and, in LIN 2.0 files, its message ID.
    pub configurable_frames: Vec<(String, Option<u32>)>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleTableDef {
    pub name: String,
    pub entries: Vec<ScheduleEntry>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingTypeDef {
    pub name: String,
    pub values: Vec<EncodingValue>,
    pub pos: Position,
}

/// `<encoding>: <signal>, <signal>... ;`
#[derive(Debug, Clone, PartialEq)]
pub struct RepresentationDef {
    pub encoding: String,
    pub signals: Vec<String>,
    pub pos: Position,
}
