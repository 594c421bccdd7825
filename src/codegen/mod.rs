//! # codegen
//!
//! Renders codec plans into target-language source: one record type per
//! message, holding raw signal values in the smallest fitting numeric kind,
//! plus a pack and an unpack routine implementing the planned bit spans.
//!
//! Backends implement [`Target`], which supplies naming, type, statement and
//! expression syntax; the span arithmetic and multiplexing logic live here
//! and are shared by every backend.

pub mod c;
pub mod rust;
pub mod writer;

use log::debug;
use serde::Serialize;

use crate::codec::plan::{CodecPlan, MessagePlan, width_mask};
use crate::core::strings::format_f64;
use crate::types::errors::{GenerationError, PlanError};
use crate::types::network::Network;
use crate::types::signal::{MuxSelector, ValueType};

pub use c::{CTarget, CTargetOptions};
pub use rust::{RustTarget, RustTargetOptions};
pub use writer::SourceWriter;

/// Numeric kind of a generated field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NumericKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl NumericKind {
    /// Smallest kind holding a raw value of `width` bits.
    pub fn for_field(width: u16, value_type: ValueType) -> Self {
        let unsigned = [NumericKind::U8, NumericKind::U16, NumericKind::U32, NumericKind::U64];
        let signed = [NumericKind::I8, NumericKind::I16, NumericKind::I32, NumericKind::I64];
        let slot = match width {
            0..=8 => 0,
            9..=16 => 1,
            17..=32 => 2,
            _ => 3,
        };
        match value_type {
            ValueType::Unsigned => unsigned[slot],
            ValueType::Signed => signed[slot],
            ValueType::Float32 => NumericKind::F32,
            ValueType::Float64 => NumericKind::F64,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            NumericKind::U8 | NumericKind::I8 => 8,
            NumericKind::U16 | NumericKind::I16 => 16,
            NumericKind::U32 | NumericKind::I32 | NumericKind::F32 => 32,
            NumericKind::U64 | NumericKind::I64 | NumericKind::F64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumericKind::I8 | NumericKind::I16 | NumericKind::I32 | NumericKind::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericKind::F32 | NumericKind::F64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NumericKind::U8 => "u8",
            NumericKind::U16 => "u16",
            NumericKind::U32 => "u32",
            NumericKind::U64 => "u64",
            NumericKind::I8 => "i8",
            NumericKind::I16 => "i16",
            NumericKind::I32 => "i32",
            NumericKind::I64 => "i64",
            NumericKind::F32 => "f32",
            NumericKind::F64 => "f64",
        }
    }
}

/// Which routine an expression is rendered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routine {
    Pack,
    Unpack,
}

/// One generated field.
#[derive(Clone, Debug)]
pub struct Field<'a> {
    pub ident: String,
    pub kind: NumericKind,
    pub type_name: &'static str,
    pub plan: &'a CodecPlan,
    pub unit: String,
}

/// A message as seen by a backend.
#[derive(Clone, Debug)]
pub struct MessageView<'a> {
    pub ident: String,
    pub plan: &'a MessagePlan,
    /// Declaration order.
    pub fields: Vec<Field<'a>>,
}

/// Backend capability: everything that differs between target languages.
pub trait Target: Sync {
    fn name(&self) -> &'static str;

    fn file_name(&self, network: &Network) -> String;

    fn indent(&self) -> &'static str {
        "    "
    }

    /// Widest integer field the target can declare.
    fn max_integer_bits(&self) -> u16 {
        64
    }

    fn numeric_type(&self, kind: NumericKind) -> Result<&'static str, GenerationError>;

    fn is_reserved(&self, ident: &str) -> bool;

    fn type_ident(&self, message: &str) -> String;

    fn field_ident(&self, signal: &str) -> String;

    fn comment(&self, text: &str) -> String;

    /// Field access inside `routine`.
    fn field_ref(&self, routine: Routine, field: &str) -> String;

    /// Frame byte `index` widened to the scratch word.
    fn byte_expr(&self, index: u16) -> String;

    /// Binds the scratch word `raw` to `expr`.
    fn bind_raw(&self, expr: &str) -> String;

    /// ORs the low byte of `expr` into frame byte `index`.
    fn or_into_byte(&self, index: u16, expr: &str) -> String;

    /// Field value computed from the right aligned bits in `raw`.
    fn field_from_raw(&self, field: &Field<'_>) -> String;

    /// Bits of a field value as a scratch word, before masking.
    fn field_bits(&self, routine: Routine, field: &Field<'_>) -> String;

    /// Field value as a double precision float.
    fn field_as_f64(&self, field_ref: &str) -> String;

    fn begin_if(&self, condition: &str) -> String;

    fn prologue(&self, w: &mut SourceWriter, network: &Network);

    fn epilogue(&self, _w: &mut SourceWriter, _network: &Network) {}

    /// Record type of the message. May open a block closed by [`Target::end_message`].
    fn message_decl(&self, w: &mut SourceWriter, msg: &MessageView<'_>);

    fn begin_routine(&self, w: &mut SourceWriter, msg: &MessageView<'_>, routine: Routine);

    fn end_routine(&self, w: &mut SourceWriter, msg: &MessageView<'_>, routine: Routine);

    /// Accessor returning the physical value `expr` of `field`.
    fn physical_getter(&self, w: &mut SourceWriter, msg: &MessageView<'_>, field: &Field<'_>, expr: &str);

    fn end_message(&self, w: &mut SourceWriter, msg: &MessageView<'_>);
}

/// Output of one target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedSource {
    pub target: &'static str,
    pub file_name: String,
    pub text: String,
    /// Messages rendered, in network order.
    pub messages: Vec<String>,
    /// Messages left out because their plan failed.
    pub omitted: Vec<String>,
}

/// Literal that parses as a float in both C and Rust.
pub(crate) fn float_literal(value: f64) -> String {
    let text = format_f64(value);
    if text.contains(['.', 'e', 'E']) || !text.chars().all(|c| c.is_ascii_digit() || c == '-') {
        text
    } else {
        format!("{text}.0")
    }
}

fn unique_ident(target: &dyn Target, base: String, taken: &mut Vec<String>) -> String {
    let mut ident = if target.is_reserved(&base) {
        format!("{base}_")
    } else {
        base
    };
    if taken.contains(&ident) {
        let mut n = 2;
        while taken.contains(&format!("{ident}_{n}")) {
            n += 1;
        }
        ident = format!("{ident}_{n}");
    }
    taken.push(ident.clone());
    ident
}

/// Type identifiers of `plans` in order. A message whose identifier is
/// already taken gets a numeric suffix on its name.
pub(crate) fn type_idents<'a>(
    target: &dyn Target,
    plans: impl IntoIterator<Item = &'a MessagePlan>,
) -> Vec<String> {
    let mut taken: Vec<String> = Vec::new();
    plans
        .into_iter()
        .map(|plan| {
            let mut ident = target.type_ident(&plan.name);
            let mut n = 2;
            while taken.contains(&ident) {
                ident = target.type_ident(&format!("{}_{n}", plan.name));
                n += 1;
            }
            taken.push(ident.clone());
            ident
        })
        .collect()
}

fn message_view<'a>(
    network: &Network,
    plan: &'a MessagePlan,
    ident: String,
    target: &dyn Target,
) -> Result<MessageView<'a>, GenerationError> {
    let mut taken = Vec::new();
    let mut fields = Vec::with_capacity(plan.signals.len());
    for signal in &plan.signals {
        let kind = NumericKind::for_field(signal.width, signal.value_type);
        if !kind.is_float() && kind.bits() > target.max_integer_bits() {
            return Err(GenerationError::UnsupportedWidth {
                target: target.name(),
                message: plan.name.clone(),
                signal: signal.name.clone(),
                width: signal.width,
            });
        }
        let unit = network
            .get_sig_by_key(signal.key)
            .map(|s| s.unit.clone())
            .unwrap_or_default();
        fields.push(Field {
            ident: unique_ident(target, target.field_ident(&signal.name), &mut taken),
            kind,
            type_name: target.numeric_type(kind)?,
            plan: signal,
            unit,
        });
    }
    Ok(MessageView {
        ident,
        plan,
        fields,
    })
}

/// Bits of `field` masked to its width.
fn masked_bits(target: &dyn Target, routine: Routine, field: &Field<'_>) -> String {
    let bits = target.field_bits(routine, field);
    let width = field.plan.width;
    if field.kind.is_float() || width >= 64 || (!field.kind.is_signed() && width == field.kind.bits()) {
        bits
    } else {
        format!("({bits} & {:#x})", width_mask(width))
    }
}

/// Condition under which `field` is present, `None` for ungated fields.
fn gate_condition(target: &dyn Target, msg: &MessageView<'_>, field: &Field<'_>, routine: Routine) -> Option<String> {
    let chain = msg.plan.gating_chain(field.plan);
    if chain.is_empty() {
        return None;
    }
    let clauses: Vec<String> = chain
        .iter()
        .rev()
        .map(|(switch, mux)| {
            let value = msg
                .fields
                .iter()
                .find(|f| std::ptr::eq(f.plan, *switch))
                .map(|f| masked_bits(target, routine, f))
                .unwrap_or_else(|| "0".to_string());
            let alternatives: Vec<String> = mux
                .selectors
                .iter()
                .map(|s| match *s {
                    MuxSelector::Value(v) => format!("{value} == {v}"),
                    MuxSelector::Range { min: 0, max } => format!("{value} <= {max}"),
                    MuxSelector::Range { min, max } => format!("({value} >= {min} && {value} <= {max})"),
                })
                .collect();
            match alternatives.len() {
                0 => "false".to_string(),
                1 if chain.len() == 1 => alternatives[0].clone(),
                1 => format!("({})", alternatives[0]),
                _ => format!("({})", alternatives.join(" || ")),
            }
        })
        .collect();
    Some(clauses.join(" && "))
}

/// Fields in routine order: ungated first, then by multiplexing depth.
fn routine_order<'v, 'a>(msg: &'v MessageView<'a>) -> Vec<&'v Field<'a>> {
    let mut ordered: Vec<(usize, &Field<'a>)> = msg
        .fields
        .iter()
        .map(|f| (msg.plan.gating_chain(f.plan).len(), f))
        .collect();
    ordered.sort_by_key(|(depth, _)| *depth);
    ordered.into_iter().map(|(_, f)| f).collect()
}

fn extract_expr(target: &dyn Target, plan: &CodecPlan) -> String {
    let terms: Vec<String> = plan
        .spans
        .iter()
        .map(|span| {
            let mut term = target.byte_expr(span.byte);
            if span.bit_offset > 0 {
                term = format!("({term} >> {})", span.bit_offset);
            }
            if span.bit_offset + span.bit_count < 8 {
                term = format!("({term} & {:#x})", span.mask());
            }
            if span.value_shift > 0 {
                term = format!("({term} << {})", span.value_shift);
            }
            term
        })
        .collect();
    terms.join(" | ")
}

fn write_unpack(target: &dyn Target, w: &mut SourceWriter, msg: &MessageView<'_>) {
    target.begin_routine(w, msg, Routine::Unpack);
    for field in routine_order(msg) {
        let gate = gate_condition(target, msg, field, Routine::Unpack);
        if let Some(condition) = &gate {
            w.open(target.begin_if(condition));
        }
        w.line(target.bind_raw(&extract_expr(target, field.plan)));
        w.line(format!(
            "{} = {};",
            target.field_ref(Routine::Unpack, &field.ident),
            target.field_from_raw(field)
        ));
        if gate.is_some() {
            w.close("}");
        }
    }
    target.end_routine(w, msg, Routine::Unpack);
}

fn write_pack(target: &dyn Target, w: &mut SourceWriter, msg: &MessageView<'_>) {
    target.begin_routine(w, msg, Routine::Pack);
    for field in routine_order(msg) {
        let gate = gate_condition(target, msg, field, Routine::Pack);
        if let Some(condition) = &gate {
            w.open(target.begin_if(condition));
        }
        w.line(target.bind_raw(&masked_bits(target, Routine::Pack, field)));
        for span in &field.plan.spans {
            let mut value = "raw".to_string();
            if span.value_shift > 0 {
                value = format!("({value} >> {})", span.value_shift);
            }
            value = format!("({value} & {:#x})", span.mask());
            if span.bit_offset > 0 {
                value = format!("({value} << {})", span.bit_offset);
            }
            w.line(target.or_into_byte(span.byte, &value));
        }
        if gate.is_some() {
            w.close("}");
        }
    }
    target.end_routine(w, msg, Routine::Pack);
}

/// Source of one message: record type, unpack, pack and physical accessors.
pub fn render_message(
    network: &Network,
    plan: &MessagePlan,
    target: &dyn Target,
) -> Result<String, GenerationError> {
    render_named(network, plan, target.type_ident(&plan.name), target)
}

/// [`render_message`] under a type identifier chosen by the caller.
pub(crate) fn render_named(
    network: &Network,
    plan: &MessagePlan,
    ident: String,
    target: &dyn Target,
) -> Result<String, GenerationError> {
    let msg = message_view(network, plan, ident, target)?;
    let mut w = SourceWriter::new(target.indent());
    target.message_decl(&mut w, &msg);
    write_unpack(target, &mut w, &msg);
    write_pack(target, &mut w, &msg);
    for field in &msg.fields {
        let value = target.field_as_f64(&target.field_ref(Routine::Pack, &field.ident));
        let t = field.plan.transform;
        let expr = format!("{value} * {} + {}", float_literal(t.scale), float_literal(t.offset));
        target.physical_getter(&mut w, &msg, field, &expr);
    }
    target.end_message(&mut w, &msg);
    debug!("rendered {} for target {}", plan.name, target.name());
    Ok(w.finish())
}

/// Joins rendered messages into one source file.
pub fn assemble(
    network: &Network,
    target: &dyn Target,
    rendered: Vec<(String, String)>,
    failed: &[&PlanError],
) -> GeneratedSource {
    let mut w = SourceWriter::new(target.indent());
    target.prologue(&mut w, network);
    for err in failed {
        w.line(target.comment(&format!("not generated: {err}")));
    }
    let mut messages = Vec::with_capacity(rendered.len());
    for (name, text) in rendered {
        w.blank();
        w.raw(&text);
        messages.push(name);
    }
    w.blank();
    target.epilogue(&mut w, network);
    GeneratedSource {
        target: target.name(),
        file_name: target.file_name(network),
        text: w.finish(),
        messages,
        omitted: failed.iter().map(|e| e.message.clone()).collect(),
    }
}

/// Renders every successfully planned message for `target`.
///
/// Messages whose plan failed are left out and listed in
/// [`GeneratedSource::omitted`]; a message the target cannot represent fails
/// the whole target.
pub fn generate(
    network: &Network,
    plans: &[Result<MessagePlan, PlanError>],
    target: &dyn Target,
) -> Result<GeneratedSource, GenerationError> {
    let planned: Vec<&MessagePlan> = plans.iter().filter_map(|p| p.as_ref().ok()).collect();
    let idents = type_idents(target, planned.iter().copied());
    let mut rendered = Vec::with_capacity(planned.len());
    for (plan, ident) in planned.into_iter().zip(idents) {
        rendered.push((plan.name.clone(), render_named(network, plan, ident, target)?));
    }
    let failed: Vec<&PlanError> = plans.iter().filter_map(|p| p.as_ref().err()).collect();
    Ok(assemble(network, target, rendered, &failed))
}

/// Identifier base for generated files.
pub(crate) fn file_stem(network: &Network) -> String {
    if network.name.trim().is_empty() {
        "network".to_string()
    } else {
        crate::core::strings::to_snake_case(&network.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::plan::plan_message;
    use crate::types::message::{IdFormat, Message};
    use crate::types::network::{BusType, MessageKey};
    use crate::types::signal::{ByteOrder, MuxInfo, MuxRole, Signal};

    pub(crate) fn speed_network() -> (Network, MessageKey) {
        let mut net = Network::new("Demo", BusType::Can);
        let mk = net.add_message(Message::new("Speed", 0x100, IdFormat::Standard, 8));
        let mut speed = Signal::new("VehicleSpeed", 0, 16, ByteOrder::LittleEndian);
        speed.scale = 0.1;
        speed.unit = "km/h".to_string();
        net.add_signal(mk, speed);
        let mut temp = Signal::new("Temp", 23, 12, ByteOrder::BigEndian);
        temp.value_type = ValueType::Signed;
        temp.offset = -40.0;
        net.add_signal(mk, temp);
        (net, mk)
    }

    pub(crate) fn mux_network() -> (Network, MessageKey) {
        let mut net = Network::new("Demo", BusType::Can);
        let mk = net.add_message(Message::new("Mux", 0x200, IdFormat::Standard, 8));
        let mut mode = Signal::new("Mode", 0, 1, ByteOrder::LittleEndian);
        mode.mux.role = MuxRole::Multiplexor;
        let mode = net.add_signal(mk, mode).unwrap();
        for (name, value) in [("A", 0), ("B", 1)] {
            let mut s = Signal::new(name, 8, 8, ByteOrder::LittleEndian);
            s.mux = MuxInfo {
                role: MuxRole::Multiplexed,
                switch: Some(mode),
                selectors: vec![MuxSelector::Value(value)],
            };
            net.add_signal(mk, s);
        }
        (net, mk)
    }

    #[test]
    fn test_numeric_kind_is_smallest_fit() {
        assert_eq!(NumericKind::for_field(1, ValueType::Unsigned), NumericKind::U8);
        assert_eq!(NumericKind::for_field(9, ValueType::Unsigned), NumericKind::U16);
        assert_eq!(NumericKind::for_field(16, ValueType::Signed), NumericKind::I16);
        assert_eq!(NumericKind::for_field(33, ValueType::Signed), NumericKind::I64);
        assert_eq!(NumericKind::for_field(32, ValueType::Float32), NumericKind::F32);
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(1.0), "1.0");
        assert_eq!(float_literal(0.0), "0.0");
        assert_eq!(float_literal(-40.0), "-40.0");
        assert_eq!(float_literal(0.1), "0.1");
    }

    #[test]
    fn test_extract_expression() {
        let (net, mk) = speed_network();
        let plan = plan_message(&net, mk).unwrap();
        let target = RustTarget::default();
        assert_eq!(
            extract_expr(&target, &plan.signals[0]),
            "((data[1] as u64) << 8) | (data[0] as u64)"
        );
        // Motorola start 23, 12 bits: byte 2 whole, then the top nibble of byte 3.
        assert_eq!(
            extract_expr(&target, &plan.signals[1]),
            "((data[2] as u64) << 4) | ((data[3] as u64) >> 4)"
        );
    }

    #[test]
    fn test_gate_condition_and_order() {
        let (net, mk) = mux_network();
        let plan = plan_message(&net, mk).unwrap();
        let target = RustTarget::default();
        let msg = message_view(&net, &plan, "Mux".to_string(), &target).unwrap();
        assert_eq!(gate_condition(&target, &msg, &msg.fields[0], Routine::Unpack), None);
        assert_eq!(
            gate_condition(&target, &msg, &msg.fields[2], Routine::Pack).as_deref(),
            Some("((self.mode as u64) & 0x1) == 1")
        );
        let order: Vec<&str> = routine_order(&msg).iter().map(|f| f.ident.as_str()).collect();
        assert_eq!(order, vec!["mode", "a", "b"]);
    }

    #[test]
    fn test_failed_plans_are_omitted_and_listed() {
        let (mut net, mk) = speed_network();
        let bad = net.add_message(Message::new("Broken", 0x300, IdFormat::Standard, 1));
        net.add_signal(bad, Signal::new("TooLong", 0, 16, ByteOrder::LittleEndian));
        let plans = vec![plan_message(&net, mk), plan_message(&net, bad)];

        let out = generate(&net, &plans, &RustTarget::default()).unwrap();
        assert_eq!(out.messages, vec!["Speed"]);
        assert_eq!(out.omitted, vec!["Broken"]);
        assert!(out.text.contains("pub struct Speed"));
        assert!(!out.text.contains("pub struct Broken"));
        assert!(out.text.contains("// not generated: cannot plan signal 'TooLong' of message 'Broken'"));
    }

    #[test]
    fn test_duplicate_and_reserved_field_names() {
        let mut net = Network::new("Demo", BusType::Can);
        let mk = net.add_message(Message::new("Odd", 0x1, IdFormat::Standard, 8));
        net.add_signal(mk, Signal::new("type", 0, 8, ByteOrder::LittleEndian));
        net.add_signal(mk, Signal::new("Level", 8, 8, ByteOrder::LittleEndian));
        net.add_signal(mk, Signal::new("LEVEL", 16, 8, ByteOrder::LittleEndian));
        let plan = plan_message(&net, mk).unwrap();
        let msg = message_view(&net, &plan, "Odd".to_string(), &RustTarget::default()).unwrap();
        let idents: Vec<&str> = msg.fields.iter().map(|f| f.ident.as_str()).collect();
        assert_eq!(idents, vec!["type_", "level", "level_2"]);
    }

    #[test]
    fn test_colliding_message_names_get_suffixes() {
        let mut net = Network::new("Demo", BusType::Can);
        for (name, id) in [("ENG_DATA", 0x10), ("EngData", 0x11), ("eng_data", 0x12)] {
            let mk = net.add_message(Message::new(name, id, IdFormat::Standard, 8));
            net.add_signal(mk, Signal::new("Rpm", 0, 16, ByteOrder::LittleEndian));
        }
        let plans: Vec<_> = net.messages_order.iter().map(|&mk| plan_message(&net, mk)).collect();

        let rust = generate(&net, &plans, &RustTarget::default()).unwrap();
        for ident in ["EngData", "EngData2", "EngData3"] {
            assert_eq!(rust.text.matches(&format!("pub struct {ident} {{")).count(), 1);
        }

        let c = generate(&net, &plans, &CTarget::default()).unwrap();
        for ident in ["eng_data", "eng_data_2", "eng_data_3"] {
            assert_eq!(c.text.matches(&format!("}} {ident}_t;")).count(), 1);
            assert!(c.text.contains(&format!("static inline void {ident}_unpack(")));
        }
        assert_eq!(c.messages, vec!["ENG_DATA", "EngData", "eng_data"]);
    }
}
