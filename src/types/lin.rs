use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::network::{MessageKey, NodeKey};

/// Cluster-wide LIN settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinCluster {
    pub protocol_version: String,
    pub language_version: String,
    pub speed_bps: f64,
    pub channel_name: Option<String>,
    pub master: Option<NodeKey>,
    pub time_base_ms: f64,
    pub jitter_ms: f64,
    pub slaves: Vec<NodeKey>,
    pub sporadic_frames: Vec<SporadicFrame>,
    pub event_triggered_frames: Vec<EventTriggeredFrame>,
    /// Signal encoding types by name.
    pub encodings: BTreeMap<String, SignalEncoding>,
}

/// Sporadic frame: a slot shared by unconditional frames sent on change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SporadicFrame {
    pub name: String,
    pub frames: Vec<MessageKey>,
}

/// Event-triggered frame: a slot answered by whichever slave has new data.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventTriggeredFrame {
    pub name: String,
    /// Schedule table resolving collisions, when declared.
    pub collision_schedule: Option<String>,
    pub id: u32,
    pub frames: Vec<MessageKey>,
}

/// LIN signal encoding type (`Signal_encoding_types` / NCF `encoding`).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SignalEncoding {
    pub name: String,
    pub values: Vec<EncodingValue>,
}

impl SignalEncoding {
    /// First physical range, which provides the signal scaling.
    pub fn physical(&self) -> Option<&PhysicalRange> {
        self.values.iter().find_map(|v| match v {
            EncodingValue::Physical(range) => Some(range),
            _ => None,
        })
    }

    pub fn logical_values(&self) -> impl Iterator<Item = (u64, &str)> + '_ {
        self.values.iter().filter_map(|v| match v {
            EncodingValue::Logical { value, text } => Some((*value, text.as_str())),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum EncodingValue {
    Logical { value: u64, text: String },
    Physical(PhysicalRange),
    Bcd,
    Ascii,
}

/// `physical_value, min_raw, max_raw, scale, offset, "unit"`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhysicalRange {
    pub raw_min: u64,
    pub raw_max: u64,
    pub scale: f64,
    pub offset: f64,
    pub unit: String,
}
