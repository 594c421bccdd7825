//! Per-signal codec planning.
//!
//! A [`CodecPlan`] describes a signal as a list of [`BitSpan`]s, most
//! significant value bits first, plus the affine raw/physical transform. DBC
//! Motorola (sawtooth) numbering and Intel/LIN flat numbering both reduce to
//! this one representation.

use log::trace;
use serde::Serialize;

use crate::core::layout::{bit_positions, first_out_of_frame};
use crate::types::errors::{PlanError, PlanFailure};
use crate::types::message::{IdFormat, Message};
use crate::types::network::{MessageKey, Network, SignalKey};
use crate::types::signal::{ByteOrder, MuxSelector, Signal, ValueType};

/// Contiguous run of bits inside one frame byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BitSpan {
    /// Frame byte holding the run.
    pub byte: u16,
    /// LSB of the run within the byte (0..=7).
    pub bit_offset: u8,
    /// Number of bits (1..=8).
    pub bit_count: u8,
    /// Position of the run's LSB in the raw value.
    pub value_shift: u8,
}

impl BitSpan {
    pub fn mask(&self) -> u8 {
        if self.bit_count >= 8 {
            0xFF
        } else {
            ((1u16 << self.bit_count) - 1) as u8
        }
    }
}

/// physical = raw * scale + offset, with the raw domain of the field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Transform {
    pub scale: f64,
    pub offset: f64,
    /// Raw domain of the field.
    pub raw_min: f64,
    pub raw_max: f64,
}

impl Transform {
    pub fn to_physical(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }

    /// Unrounded raw value of a physical value.
    pub fn to_raw(&self, physical: f64) -> f64 {
        (physical - self.offset) / self.scale
    }
}

/// Gating of a multiplexed signal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MuxCondition {
    pub multiplexor: SignalKey,
    pub multiplexor_name: String,
    pub selectors: Vec<MuxSelector>,
}

impl MuxCondition {
    pub fn is_active(&self, switch: u64) -> bool {
        self.selectors.iter().any(|s| s.contains(switch))
    }
}

/// Encode/decode procedure of one signal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CodecPlan {
    pub key: SignalKey,
    pub name: String,
    pub width: u16,
    pub value_type: ValueType,
    pub byte_order: ByteOrder,
    /// Most significant value bits first.
    pub spans: Vec<BitSpan>,
    pub transform: Transform,
    pub mux: Option<MuxCondition>,
    /// True when other signals are gated by this one.
    pub is_multiplexor: bool,
}

/// Plans of every signal of one message, in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessagePlan {
    pub key: MessageKey,
    pub name: String,
    pub id: u32,
    pub id_format: IdFormat,
    pub byte_length: u16,
    pub signals: Vec<CodecPlan>,
}

impl MessagePlan {
    pub fn signal_by_key(&self, key: SignalKey) -> Option<&CodecPlan> {
        self.signals.iter().find(|s| s.key == key)
    }

    /// Gating conditions of `plan`, innermost first. Stops at a switch that is
    /// not part of the message or when the chain loops.
    pub fn gating_chain<'a>(&'a self, plan: &'a CodecPlan) -> Vec<(&'a CodecPlan, &'a MuxCondition)> {
        let mut chain = Vec::new();
        let mut current = plan;
        while let Some(mux) = &current.mux
            && chain.len() <= self.signals.len()
        {
            let Some(switch) = self.signal_by_key(mux.multiplexor) else {
                break;
            };
            chain.push((switch, mux));
            current = switch;
        }
        chain
    }
}

/// Largest value of a `width`-bit field, as the all-ones mask.
pub(crate) fn width_mask(width: u16) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Largest `f64` not above `max`. Integers past 2^53 would otherwise round up
/// out of the field's range.
fn float_floor(max: u64) -> f64 {
    let f = max as f64;
    if f as u128 > u128::from(max) {
        f64::from_bits(f.to_bits() - 1)
    } else {
        f
    }
}

fn raw_domain(width: u16, value_type: ValueType) -> (f64, f64) {
    match value_type {
        ValueType::Unsigned => (0.0, float_floor(width_mask(width))),
        ValueType::Signed => {
            let half = 2f64.powi(i32::from(width) - 1);
            (-half, float_floor(width_mask(width - 1)))
        }
        ValueType::Float32 => (f64::from(f32::MIN), f64::from(f32::MAX)),
        ValueType::Float64 => (f64::MIN, f64::MAX),
    }
}

/// Bit spans of an Intel field, LSB first. Bits count in `u32` since a
/// field may end past bit 65535 of a long frame.
fn compile_intel(start_bit: u16, width: u16) -> Vec<BitSpan> {
    let mut spans = Vec::new();
    let mut remaining = u32::from(width);
    let mut bit = u32::from(start_bit);
    let mut dst = 0u32;
    while remaining > 0 {
        let bit_offset = (bit % 8) as u8;
        let take = remaining.min(u32::from(8 - bit_offset));
        spans.push(BitSpan {
            byte: (bit / 8) as u16,
            bit_offset,
            bit_count: take as u8,
            value_shift: dst as u8,
        });
        bit += take;
        dst += take;
        remaining -= take;
    }
    spans
}

/// Bit spans of a Motorola field, MSB first. The start bit is the MSB in
/// sawtooth numbering.
fn compile_motorola(start_bit: u16, width: u16) -> Vec<BitSpan> {
    let mut spans = Vec::new();
    let mut remaining = width;
    let mut byte = start_bit / 8;
    let mut bit_msb = (start_bit % 8) as u8;
    while remaining > 0 {
        let take = (u16::from(bit_msb) + 1).min(remaining);
        let bit_offset = bit_msb + 1 - take as u8;
        spans.push(BitSpan {
            byte,
            bit_offset,
            bit_count: take as u8,
            value_shift: (remaining - take) as u8,
        });
        remaining -= take;
        if bit_offset == 0 {
            byte += 1;
            bit_msb = 7;
        } else {
            bit_msb = bit_offset - 1;
        }
    }
    spans
}

/// Computes the codec plan of `signal` within `message`.
pub fn plan(signal: &Signal, message: &Message, network: &Network) -> Result<CodecPlan, PlanError> {
    let fail = |reason: PlanFailure| PlanError {
        message: message.name.clone(),
        signal: signal.name.clone(),
        reason,
    };

    let width = signal.width;
    if width == 0 || width > 64 {
        return Err(fail(PlanFailure::WidthOutOfRange { width }));
    }
    if let Some(expected) = signal.value_type.float_width()
        && width != expected
    {
        return Err(fail(PlanFailure::FloatWidth { width, expected }));
    }
    let byte_order = signal
        .byte_order
        .ok_or_else(|| fail(PlanFailure::UnspecifiedByteOrder))?;

    let positions = bit_positions(signal.start_bit, width, byte_order);
    if let Some(bit) = first_out_of_frame(&positions, message.byte_length) {
        return Err(fail(PlanFailure::OutOfFrame {
            bit: i64::from(bit),
            total_bits: message.total_bits(),
        }));
    }

    let spans = match byte_order {
        ByteOrder::LittleEndian => {
            let mut spans = compile_intel(signal.start_bit, width);
            spans.reverse();
            spans
        }
        ByteOrder::BigEndian => compile_motorola(signal.start_bit, width),
    };

    let mux = if signal.mux.role.is_gated() {
        let switch = signal
            .mux
            .switch
            .and_then(|k| network.get_sig_by_key(k).map(|s| (k, s)));
        let Some((multiplexor, switch)) = switch else {
            return Err(fail(PlanFailure::MissingMultiplexor));
        };
        Some(MuxCondition {
            multiplexor,
            multiplexor_name: switch.name.clone(),
            selectors: signal.mux.selectors.clone(),
        })
    } else {
        None
    };

    let (raw_min, raw_max) = raw_domain(width, signal.value_type);
    let key = network
        .get_sig_key_by_name(signal.message, &signal.name)
        .unwrap_or_default();
    trace!(
        "planned {}.{}: {} spans {:?}",
        message.name,
        signal.name,
        spans.len(),
        spans
    );
    Ok(CodecPlan {
        key,
        name: signal.name.clone(),
        width,
        value_type: signal.value_type,
        byte_order,
        spans,
        transform: Transform {
            scale: signal.scale,
            offset: signal.offset,
            raw_min,
            raw_max,
        },
        mux,
        is_multiplexor: signal.mux.role.is_switch(),
    })
}

/// Plans every signal of a message. The first failing signal fails the
/// whole message.
pub fn plan_message(network: &Network, mk: MessageKey) -> Result<MessagePlan, PlanError> {
    let message = network.get_message_by_key(mk).ok_or_else(|| PlanError {
        message: String::new(),
        signal: String::new(),
        reason: PlanFailure::UnknownMessage,
    })?;
    let signals = network
        .message_signals(mk)
        .into_iter()
        .map(|(sk, signal)| plan(signal, message, network).map(|p| CodecPlan { key: sk, ..p }))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MessagePlan {
        key: mk,
        name: message.name.clone(),
        id: message.id,
        id_format: message.id_format,
        byte_length: message.byte_length,
        signals,
    })
}
