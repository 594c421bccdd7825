use serde::Serialize;

/// LIN schedule table.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Schedule {
    pub name: String,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    /// Names of the frames transmitted by this table, in slot order.
    pub fn frame_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().filter_map(|e| e.command.frame_name())
    }

    /// Sum of the slot delays.
    pub fn cycle_ms(&self) -> f64 {
        self.entries.iter().map(|e| e.delay_ms).sum()
    }
}

/// One slot: a command followed by its delay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub command: ScheduleCommand,
    pub delay_ms: f64,
}

/// Schedule table command.
///
/// Frames are referenced by name; whether the name exists is a property of
/// the whole network and is checked by the validator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ScheduleCommand {
    Frame(String),
    MasterReq,
    SlaveResp,
    AssignNad {
        node: String,
    },
    ConditionalChangeNad {
        nad: u8,
        id: u8,
        byte: u8,
        mask: u8,
        inv: u8,
        new_nad: u8,
    },
    DataDump {
        node: String,
        data: [u8; 5],
    },
    SaveConfiguration {
        node: String,
    },
    AssignFrameIdRange {
        node: String,
        index: u8,
        pids: Vec<u8>,
    },
    FreeFormat {
        data: [u8; 8],
    },
    AssignFrameId {
        node: String,
        frame: String,
    },
}

impl ScheduleCommand {
    /// Frame transmitted in this slot, when the command names one.
    pub fn frame_name(&self) -> Option<&str> {
        match self {
            ScheduleCommand::Frame(name) => Some(name),
            ScheduleCommand::MasterReq => Some("MasterReq"),
            ScheduleCommand::SlaveResp => Some("SlaveResp"),
            _ => None,
        }
    }

    /// Node named by a configuration command.
    pub fn node_name(&self) -> Option<&str> {
        match self {
            ScheduleCommand::AssignNad { node }
            | ScheduleCommand::DataDump { node, .. }
            | ScheduleCommand::SaveConfiguration { node }
            | ScheduleCommand::AssignFrameIdRange { node, .. }
            | ScheduleCommand::AssignFrameId { node, .. } => Some(node),
            _ => None,
        }
    }
}
