//! Rust backend: a module with one `struct` per message and inherent
//! `unpack`/`pack` methods over fixed-size byte arrays.

use serde::{Deserialize, Serialize};

use crate::codegen::{Field, MessageView, NumericKind, Routine, SourceWriter, Target, file_stem};
use crate::core::strings::{to_pascal_case, to_snake_case};
use crate::types::errors::GenerationError;
use crate::types::network::Network;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RustTargetOptions {
    /// Adds `serde::Serialize`/`Deserialize` derives to the message structs.
    pub derive_serde: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RustTarget {
    pub options: RustTargetOptions,
}

impl RustTarget {
    pub fn new(options: RustTargetOptions) -> Self {
        RustTarget { options }
    }
}

impl Target for RustTarget {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn file_name(&self, network: &Network) -> String {
        format!("{}_codec.rs", file_stem(network))
    }

    fn numeric_type(&self, kind: NumericKind) -> Result<&'static str, GenerationError> {
        Ok(kind.as_str())
    }

    fn is_reserved(&self, ident: &str) -> bool {
        KEYWORDS.contains(&ident)
    }

    fn type_ident(&self, message: &str) -> String {
        let ident = to_pascal_case(message);
        if self.is_reserved(&ident) {
            format!("{ident}_")
        } else {
            ident
        }
    }

    fn field_ident(&self, signal: &str) -> String {
        to_snake_case(signal)
    }

    fn comment(&self, text: &str) -> String {
        format!("// {text}")
    }

    fn field_ref(&self, routine: Routine, field: &str) -> String {
        match routine {
            Routine::Pack => format!("self.{field}"),
            Routine::Unpack => format!("msg.{field}"),
        }
    }

    fn byte_expr(&self, index: u16) -> String {
        format!("(data[{index}] as u64)")
    }

    fn bind_raw(&self, expr: &str) -> String {
        format!("let raw = {expr};")
    }

    fn or_into_byte(&self, index: u16, expr: &str) -> String {
        format!("data[{index}] |= {expr} as u8;")
    }

    fn field_from_raw(&self, field: &Field<'_>) -> String {
        let width = field.plan.width;
        match field.kind {
            NumericKind::U64 => "raw".to_string(),
            NumericKind::I64 if width == 64 => "raw as i64".to_string(),
            NumericKind::I64 => format!("(raw << {0}) as i64 >> {0}", 64 - width),
            NumericKind::F32 => "f32::from_bits(raw as u32)".to_string(),
            NumericKind::F64 => "f64::from_bits(raw)".to_string(),
            kind if kind.is_signed() => {
                format!("((raw << {0}) as i64 >> {0}) as {1}", 64 - width, kind.as_str())
            }
            kind => format!("raw as {}", kind.as_str()),
        }
    }

    fn field_bits(&self, routine: Routine, field: &Field<'_>) -> String {
        let value = self.field_ref(routine, &field.ident);
        match field.kind {
            NumericKind::F32 => format!("({value}.to_bits() as u64)"),
            NumericKind::F64 => format!("{value}.to_bits()"),
            NumericKind::U64 => value,
            _ => format!("({value} as u64)"),
        }
    }

    fn field_as_f64(&self, field_ref: &str) -> String {
        format!("({field_ref} as f64)")
    }

    fn begin_if(&self, condition: &str) -> String {
        format!("if {condition} {{")
    }

    fn prologue(&self, w: &mut SourceWriter, network: &Network) {
        w.line(format!(
            "//! Codecs for the {} network `{}`. Generated by buscodec, do not edit.",
            network.bus_type, network.name
        ));
        w.blank();
        w.line("#![allow(dead_code, unused_mut, unused_parens, clippy::all)]");
    }

    fn message_decl(&self, w: &mut SourceWriter, msg: &MessageView<'_>) {
        let plan = msg.plan;
        w.line(format!(
            "/// `{}`: {} ID {:#X}, {} bytes.",
            plan.name, plan.id_format, plan.id, plan.byte_length
        ));
        w.line("#[derive(Debug, Clone, Copy, Default, PartialEq)]");
        if self.options.derive_serde {
            w.line("#[derive(serde::Serialize, serde::Deserialize)]");
        }
        w.open(format!("pub struct {} {{", msg.ident));
        for field in &msg.fields {
            let t = field.plan.transform;
            let unit = if field.unit.is_empty() {
                String::new()
            } else {
                format!(" [{}]", field.unit)
            };
            w.line(format!(
                "/// `{}` raw value, physical = raw * {} + {}{unit}",
                field.plan.name, t.scale, t.offset
            ));
            w.line(format!("pub {}: {},", field.ident, field.type_name));
        }
        w.close("}");
        w.blank();
        w.open(format!("impl {} {{", msg.ident));
        w.line(format!("pub const ID: u32 = {:#x};", plan.id));
        w.line(format!("pub const LEN: usize = {};", plan.byte_length));
    }

    fn begin_routine(&self, w: &mut SourceWriter, msg: &MessageView<'_>, routine: Routine) {
        let len = msg.plan.byte_length;
        w.blank();
        match routine {
            Routine::Unpack => {
                w.open(format!("pub fn unpack(data: &[u8; {len}]) -> Self {{"));
                w.line("let mut msg = Self::default();");
            }
            Routine::Pack => {
                w.open(format!("pub fn pack(&self) -> [u8; {len}] {{"));
                w.line(format!("let mut data = [0u8; {len}];"));
            }
        }
    }

    fn end_routine(&self, w: &mut SourceWriter, _msg: &MessageView<'_>, routine: Routine) {
        match routine {
            Routine::Unpack => w.line("msg"),
            Routine::Pack => w.line("data"),
        }
        w.close("}");
    }

    fn physical_getter(&self, w: &mut SourceWriter, _msg: &MessageView<'_>, field: &Field<'_>, expr: &str) {
        w.blank();
        w.open(format!("pub fn {}_physical(&self) -> f64 {{", field.ident));
        w.line(expr);
        w.close("}");
    }

    fn end_message(&self, w: &mut SourceWriter, _msg: &MessageView<'_>) {
        w.close("}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::plan::plan_message;
    use crate::codegen::tests::{mux_network, speed_network};
    use crate::codegen::{generate, render_message};

    #[test]
    fn test_render_speed_message() {
        let (net, mk) = speed_network();
        let plan = plan_message(&net, mk).unwrap();
        let text = render_message(&net, &plan, &RustTarget::default()).unwrap();
        let expected = "\
/// `Speed`: standard ID 0x100, 8 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    /// `VehicleSpeed` raw value, physical = raw * 0.1 + 0 [km/h]
    pub vehicle_speed: u16,
    /// `Temp` raw value, physical = raw * 1 + -40
    pub temp: i16,
}

impl Speed {
    pub const ID: u32 = 0x100;
    pub const LEN: usize = 8;

    pub fn unpack(data: &[u8; 8]) -> Self {
        let mut msg = Self::default();
        let raw = ((data[1] as u64) << 8) | (data[0] as u64);
        msg.vehicle_speed = raw as u16;
        let raw = ((data[2] as u64) << 4) | ((data[3] as u64) >> 4);
        msg.temp = ((raw << 52) as i64 >> 52) as i16;
        msg
    }

    pub fn pack(&self) -> [u8; 8] {
        let mut data = [0u8; 8];
        let raw = (self.vehicle_speed as u64);
        data[1] |= ((raw >> 8) & 0xff) as u8;
        data[0] |= (raw & 0xff) as u8;
        let raw = ((self.temp as u64) & 0xfff);
        data[2] |= ((raw >> 4) & 0xff) as u8;
        data[3] |= ((raw & 0xf) << 4) as u8;
        data
    }

    pub fn vehicle_speed_physical(&self) -> f64 {
        (self.vehicle_speed as f64) * 0.1 + 0.0
    }

    pub fn temp_physical(&self) -> f64 {
        (self.temp as f64) * 1.0 + -40.0
    }
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_multiplexed_message() {
        let (net, mk) = mux_network();
        let plan = plan_message(&net, mk).unwrap();
        let text = render_message(&net, &plan, &RustTarget::default()).unwrap();
        assert!(text.contains(
            "        if ((msg.mode as u64) & 0x1) == 0 {\n            let raw = (data[1] as u64);\n            msg.a = raw as u8;\n        }\n"
        ));
        assert!(text.contains(
            "        if ((self.mode as u64) & 0x1) == 1 {\n            let raw = (self.b as u64);\n            data[1] |= (raw & 0xff) as u8;\n        }\n"
        ));
    }

    #[test]
    fn test_serde_derive_option() {
        let (net, mk) = speed_network();
        let plans = vec![plan_message(&net, mk)];
        let target = RustTarget::new(RustTargetOptions { derive_serde: true });
        let out = generate(&net, &plans, &target).unwrap();
        assert_eq!(out.file_name, "demo_codec.rs");
        assert!(out.text.starts_with("//! Codecs for the CAN network `Demo`."));
        assert!(out.text.contains("#[derive(serde::Serialize, serde::Deserialize)]\npub struct Speed {"));
    }
}
