//! Network invariant checks.
//!
//! [`validate`] never mutates the network and never stops at the first
//! problem: every violation found is returned, in message declaration order,
//! followed by schedule table problems.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::core::layout::{BitMask, bit_positions, first_out_of_frame};
use crate::types::errors::{ReferenceError, ReferenceKind};
use crate::types::message::{IdFormat, Message};
use crate::types::network::{BusType, MessageKey, Network, SignalKey};
use crate::types::schedule::ScheduleCommand;
use crate::types::signal::{MuxSelector, Signal};

/// A broken network invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("{id_format} identifier {id:#x} of message '{message}' is already used by '{first}'")]
    DuplicateId {
        id_format: IdFormat,
        id: u32,
        message: String,
        first: String,
    },
    #[error("signal '{signal}' of message '{message}' reaches bit {bit}, outside the {total_bits}-bit frame")]
    SignalOutOfFrame {
        message: String,
        signal: String,
        bit: u32,
        total_bits: usize,
    },
    #[error("bit range overlap in message '{message}' between '{first}' and '{second}'")]
    BitOverlap {
        message: String,
        first: String,
        second: String,
    },
    #[error("message '{message}' has multiplexed signals and {count} multiplexors, expected exactly one")]
    MultiplexorCount { message: String, count: usize },
    #[error("signal '{signal}' of message '{message}' has a zero scale factor")]
    ZeroScale { message: String, signal: String },
    #[error("signal '{signal}' of message '{message}' is {width} bits wide, expected 1..=64")]
    WidthOutOfRange {
        message: String,
        signal: String,
        width: u16,
    },
    #[error("float signal '{signal}' of message '{message}' is {width} bits wide, expected {expected}")]
    FloatWidth {
        message: String,
        signal: String,
        width: u16,
        expected: u16,
    },
    #[error("{id_format} identifier {id:#x} of message '{message}' exceeds {max:#x}")]
    IdOutOfRange {
        message: String,
        id_format: IdFormat,
        id: u32,
        max: u32,
    },
    #[error("message '{message}' has {len} bytes, a {bus} frame carries at most {max}")]
    DlcTooLarge {
        message: String,
        len: u16,
        bus: BusType,
        max: u16,
    },
    #[error("message name '{name}' is declared {count} times")]
    DuplicateMessageName { name: String, count: usize },
    #[error("signal name '{signal}' is declared {count} times in message '{message}'")]
    DuplicateSignalName {
        message: String,
        signal: String,
        count: usize,
    },
    #[error("signal '{signal}' of message '{message}' has minimum {min} greater than maximum {max}")]
    MinGreaterThanMax {
        message: String,
        signal: String,
        min: f64,
        max: f64,
    },
    #[error(transparent)]
    UnresolvedReference(ReferenceError),
}

/// Discriminant of a [`Violation`], for filtering and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    DuplicateId,
    SignalOutOfFrame,
    BitOverlap,
    MultiplexorCount,
    ZeroScale,
    WidthOutOfRange,
    FloatWidth,
    IdOutOfRange,
    DlcTooLarge,
    DuplicateMessageName,
    DuplicateSignalName,
    MinGreaterThanMax,
    UnresolvedReference,
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::DuplicateId { .. } => ViolationKind::DuplicateId,
            Violation::SignalOutOfFrame { .. } => ViolationKind::SignalOutOfFrame,
            Violation::BitOverlap { .. } => ViolationKind::BitOverlap,
            Violation::MultiplexorCount { .. } => ViolationKind::MultiplexorCount,
            Violation::ZeroScale { .. } => ViolationKind::ZeroScale,
            Violation::WidthOutOfRange { .. } => ViolationKind::WidthOutOfRange,
            Violation::FloatWidth { .. } => ViolationKind::FloatWidth,
            Violation::IdOutOfRange { .. } => ViolationKind::IdOutOfRange,
            Violation::DlcTooLarge { .. } => ViolationKind::DlcTooLarge,
            Violation::DuplicateMessageName { .. } => ViolationKind::DuplicateMessageName,
            Violation::DuplicateSignalName { .. } => ViolationKind::DuplicateSignalName,
            Violation::MinGreaterThanMax { .. } => ViolationKind::MinGreaterThanMax,
            Violation::UnresolvedReference(_) => ViolationKind::UnresolvedReference,
        }
    }
}

/// Checks every invariant of `network` and returns all violations found.
pub fn validate(network: &Network) -> Vec<Violation> {
    let mut out = Vec::new();
    let mut first_by_id: HashMap<(IdFormat, u32), &str> = HashMap::new();

    for (mk, message) in network.iter_message_entries() {
        let key = (message.id_format, message.id);
        match first_by_id.get(&key) {
            Some(first) => out.push(Violation::DuplicateId {
                id_format: message.id_format,
                id: message.id,
                message: message.name.clone(),
                first: first.to_string(),
            }),
            None => {
                first_by_id.insert(key, &message.name);
            }
        }
        check_message(network, mk, message, &mut out);
    }
    check_message_names(network, &mut out);
    check_schedules(network, &mut out);

    debug!("validated network '{}': {} violations", network.name, out.len());
    out
}

fn check_message(network: &Network, mk: MessageKey, message: &Message, out: &mut Vec<Violation>) {
    let max_id = message.id_format.max_id();
    if message.id > max_id {
        out.push(Violation::IdOutOfRange {
            message: message.name.clone(),
            id_format: message.id_format,
            id: message.id,
            max: max_id,
        });
    }
    if let Some(max) = network.bus_type.max_payload()
        && message.byte_length > max
    {
        out.push(Violation::DlcTooLarge {
            message: message.name.clone(),
            len: message.byte_length,
            bus: network.bus_type.clone(),
            max,
        });
    }

    let signals = network.message_signals(mk);
    let mut placed: Vec<(SignalKey, &Signal, BitMask)> = Vec::new();
    for &(sk, signal) in &signals {
        let mask = check_signal(message, signal, out);
        if let Some(mask) = mask {
            placed.push((sk, signal, mask));
        }
    }

    for (i, (a_key, a, a_mask)) in placed.iter().enumerate() {
        for (b_key, b, b_mask) in &placed[i + 1..] {
            if a_mask.intersects(b_mask) && !mutually_exclusive(network, *a_key, *b_key) {
                out.push(Violation::BitOverlap {
                    message: message.name.clone(),
                    first: a.name.clone(),
                    second: b.name.clone(),
                });
            }
        }
    }

    if signals.iter().any(|(_, s)| s.mux.role.is_gated()) {
        let count = network.multiplexors(mk).len();
        if count != 1 {
            out.push(Violation::MultiplexorCount {
                message: message.name.clone(),
                count,
            });
        }
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for (_, signal) in &signals {
        match counts.iter_mut().find(|(name, _)| *name == signal.name) {
            Some((_, n)) => *n += 1,
            None => counts.push((signal.name.as_str(), 1)),
        }
    }
    for (name, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
        out.push(Violation::DuplicateSignalName {
            message: message.name.clone(),
            signal: name.to_string(),
            count,
        });
    }
}

/// Per-signal checks. Returns the occupancy mask when the layout is checkable.
fn check_signal(message: &Message, signal: &Signal, out: &mut Vec<Violation>) -> Option<BitMask> {
    let names = || (message.name.clone(), signal.name.clone());
    if signal.scale == 0.0 {
        let (message, signal) = names();
        out.push(Violation::ZeroScale { message, signal });
    }
    if signal.min > signal.max {
        let (message, name) = names();
        out.push(Violation::MinGreaterThanMax {
            message,
            signal: name,
            min: signal.min,
            max: signal.max,
        });
    }
    if let Some(expected) = signal.value_type.float_width()
        && signal.width != expected
    {
        let (message, name) = names();
        out.push(Violation::FloatWidth {
            message,
            signal: name,
            width: signal.width,
            expected,
        });
    }
    if signal.width == 0 || signal.width > 64 {
        let (message, name) = names();
        out.push(Violation::WidthOutOfRange {
            message,
            signal: name,
            width: signal.width,
        });
        return None;
    }

    let positions = bit_positions(signal.start_bit, signal.width, signal.byte_order?);
    if let Some(bit) = first_out_of_frame(&positions, message.byte_length) {
        let (message_name, name) = names();
        out.push(Violation::SignalOutOfFrame {
            message: message_name,
            signal: name,
            bit,
            total_bits: message.total_bits(),
        });
    }
    Some(BitMask::from_positions(&positions))
}

/// Activation conditions of a signal: each switch on its gating chain with the
/// selectors that must hold.
fn conditions(network: &Network, sk: SignalKey) -> Vec<(SignalKey, &[MuxSelector])> {
    let mut out = Vec::new();
    let mut current = network.get_sig_by_key(sk);
    while let Some(signal) = current {
        let Some(switch) = signal.mux.switch else {
            break;
        };
        if out.iter().any(|(k, _)| *k == switch) {
            break;
        }
        out.push((switch, signal.mux.selectors.as_slice()));
        current = network.get_sig_by_key(switch);
    }
    out
}

/// True when the two signals can never be present in the same frame: both
/// depend on a common switch through disjoint selector sets.
fn mutually_exclusive(network: &Network, a: SignalKey, b: SignalKey) -> bool {
    let a_conditions = conditions(network, a);
    let b_conditions = conditions(network, b);
    a_conditions.iter().any(|(switch, a_sel)| {
        b_conditions.iter().any(|(other, b_sel)| {
            switch == other
                && !a_sel.is_empty()
                && !b_sel.is_empty()
                && !a_sel.iter().any(|x| b_sel.iter().any(|y| x.intersects(y)))
        })
    })
}

fn check_message_names(network: &Network, out: &mut Vec<Violation>) {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for message in network.iter_messages() {
        match counts.iter_mut().find(|(name, _)| *name == message.name) {
            Some((_, n)) => *n += 1,
            None => counts.push((message.name.as_str(), 1)),
        }
    }
    for (name, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
        out.push(Violation::DuplicateMessageName {
            name: name.to_string(),
            count,
        });
    }
}

fn check_schedules(network: &Network, out: &mut Vec<Violation>) {
    for schedule in &network.schedules {
        let context = format!("schedule table '{}'", schedule.name);
        for entry in &schedule.entries {
            let frame = match &entry.command {
                ScheduleCommand::AssignFrameId { frame, .. } => Some(frame.as_str()),
                command => command.frame_name(),
            };
            if let Some(name) = frame
                && network.get_msg_key_by_name(name).is_none()
            {
                out.push(Violation::UnresolvedReference(ReferenceError::new(
                    ReferenceKind::Message,
                    name,
                    context.clone(),
                )));
            }
        }
    }
}
