//! C backend: a self-contained header with one `typedef struct` per
//! message and `static inline` pack/unpack functions.

use serde::{Deserialize, Serialize};

use crate::codegen::{Field, MessageView, NumericKind, Routine, SourceWriter, Target, file_stem};
use crate::core::strings::to_snake_case;
use crate::types::errors::GenerationError;
use crate::types::network::Network;

const KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "const", "continue", "default", "do", "double",
    "else", "enum", "extern", "false", "float", "for", "goto", "if", "inline", "int", "long",
    "register", "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "true", "typedef", "union", "unsigned", "void", "volatile", "while",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CTargetOptions {
    /// Widest integer type the toolchain offers (8, 16, 32 or 64). Below 64
    /// the bit arithmetic runs on 32-bit words and `double` fields are
    /// rejected.
    pub max_integer_bits: u16,
}

impl Default for CTargetOptions {
    fn default() -> Self {
        CTargetOptions {
            max_integer_bits: 64,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CTarget {
    pub options: CTargetOptions,
}

impl CTarget {
    pub fn new(options: CTargetOptions) -> Self {
        CTarget { options }
    }

    fn word_bits(&self) -> u16 {
        if self.options.max_integer_bits >= 64 { 64 } else { 32 }
    }

    fn word(&self) -> &'static str {
        if self.word_bits() == 64 { "uint64_t" } else { "uint32_t" }
    }

    fn signed_word(&self) -> &'static str {
        if self.word_bits() == 64 { "int64_t" } else { "int32_t" }
    }

    fn prefix(msg: &MessageView<'_>) -> String {
        msg.ident.strip_suffix("_t").unwrap_or(&msg.ident).to_string()
    }
}

impl Target for CTarget {
    fn name(&self) -> &'static str {
        "c"
    }

    fn file_name(&self, network: &Network) -> String {
        format!("{}_codec.h", file_stem(network))
    }

    fn max_integer_bits(&self) -> u16 {
        self.options.max_integer_bits
    }

    fn numeric_type(&self, kind: NumericKind) -> Result<&'static str, GenerationError> {
        Ok(match kind {
            NumericKind::U8 => "uint8_t",
            NumericKind::U16 => "uint16_t",
            NumericKind::U32 => "uint32_t",
            NumericKind::U64 => "uint64_t",
            NumericKind::I8 => "int8_t",
            NumericKind::I16 => "int16_t",
            NumericKind::I32 => "int32_t",
            NumericKind::I64 => "int64_t",
            NumericKind::F32 => "float",
            NumericKind::F64 if self.word_bits() < 64 => {
                return Err(GenerationError::UnsupportedKind {
                    target: self.name(),
                    kind: "f64",
                });
            }
            NumericKind::F64 => "double",
        })
    }

    fn is_reserved(&self, ident: &str) -> bool {
        KEYWORDS.contains(&ident)
    }

    fn type_ident(&self, message: &str) -> String {
        format!("{}_t", to_snake_case(message))
    }

    fn field_ident(&self, signal: &str) -> String {
        to_snake_case(signal)
    }

    fn comment(&self, text: &str) -> String {
        format!("/* {} */", text.replace("*/", "* /"))
    }

    fn field_ref(&self, _routine: Routine, field: &str) -> String {
        format!("msg->{field}")
    }

    fn byte_expr(&self, index: u16) -> String {
        format!("(({})data[{index}])", self.word())
    }

    fn bind_raw(&self, expr: &str) -> String {
        format!("raw = {expr};")
    }

    fn or_into_byte(&self, index: u16, expr: &str) -> String {
        format!("data[{index}] |= (uint8_t){expr};")
    }

    fn field_from_raw(&self, field: &Field<'_>) -> String {
        let word = self.word_bits();
        let width = field.plan.width;
        match field.kind {
            NumericKind::F32 => "buscodec_f32_from_bits(raw)".to_string(),
            NumericKind::F64 => "buscodec_f64_from_bits(raw)".to_string(),
            kind if kind.is_signed() && width >= word => {
                format!("({})({})raw", field.type_name, self.signed_word())
            }
            kind if kind.is_signed() => format!(
                "({})(({})(raw << {2}) >> {2})",
                field.type_name,
                self.signed_word(),
                word - width
            ),
            _ => format!("({})raw", field.type_name),
        }
    }

    fn field_bits(&self, routine: Routine, field: &Field<'_>) -> String {
        let value = self.field_ref(routine, &field.ident);
        match field.kind {
            NumericKind::F32 => format!("buscodec_f32_bits({value})"),
            NumericKind::F64 => format!("buscodec_f64_bits({value})"),
            kind if kind.is_signed() => format!("(({})({}){value})", self.word(), self.signed_word()),
            _ => format!("(({}){value})", self.word()),
        }
    }

    fn field_as_f64(&self, field_ref: &str) -> String {
        if self.word_bits() < 64 {
            format!("(float){field_ref}")
        } else {
            format!("(double){field_ref}")
        }
    }

    fn begin_if(&self, condition: &str) -> String {
        format!("if ({condition}) {{")
    }

    fn prologue(&self, w: &mut SourceWriter, network: &Network) {
        let guard = format!("{}_CODEC_H", file_stem(network).to_ascii_uppercase());
        let word = self.word();
        w.line(self.comment(&format!(
            "Codecs for the {} network `{}`. Generated by buscodec, do not edit.",
            network.bus_type, network.name
        )));
        w.line(format!("#ifndef {guard}"));
        w.line(format!("#define {guard}"));
        w.blank();
        w.line("#include <stdint.h>");
        w.line("#include <string.h>");
        w.blank();
        w.line(format!(
            "static inline {word} buscodec_f32_bits(float v) {{ uint32_t b; memcpy(&b, &v, sizeof b); return b; }}"
        ));
        w.line(format!(
            "static inline float buscodec_f32_from_bits({word} raw) {{ uint32_t b = (uint32_t)raw; float v; memcpy(&v, &b, sizeof v); return v; }}"
        ));
        if self.word_bits() == 64 {
            w.line("static inline uint64_t buscodec_f64_bits(double v) { uint64_t b; memcpy(&b, &v, sizeof b); return b; }");
            w.line("static inline double buscodec_f64_from_bits(uint64_t raw) { double v; memcpy(&v, &raw, sizeof v); return v; }");
        }
    }

    fn epilogue(&self, w: &mut SourceWriter, network: &Network) {
        let guard = format!("{}_CODEC_H", file_stem(network).to_ascii_uppercase());
        w.line(format!("#endif /* {guard} */"));
    }

    fn message_decl(&self, w: &mut SourceWriter, msg: &MessageView<'_>) {
        let plan = msg.plan;
        let prefix = Self::prefix(msg).to_ascii_uppercase();
        w.line(self.comment(&format!(
            "{}: {} ID {:#X}, {} bytes",
            plan.name, plan.id_format, plan.id, plan.byte_length
        )));
        w.line(format!("#define {prefix}_ID {:#x}u", plan.id));
        w.line(format!("#define {prefix}_LEN {}u", plan.byte_length));
        w.blank();
        w.open("typedef struct {");
        for field in &msg.fields {
            let t = field.plan.transform;
            let unit = if field.unit.is_empty() {
                String::new()
            } else {
                format!(" [{}]", field.unit)
            };
            w.line(format!(
                "{} {}; {}",
                field.type_name,
                field.ident,
                self.comment(&format!("{}: physical = raw * {} + {}{unit}", field.plan.name, t.scale, t.offset))
            ));
        }
        if msg.fields.is_empty() {
            w.line("uint8_t unused;");
        }
        w.close(format!("}} {};", msg.ident));
    }

    fn begin_routine(&self, w: &mut SourceWriter, msg: &MessageView<'_>, routine: Routine) {
        let prefix = Self::prefix(msg);
        let len = msg.plan.byte_length.max(1);
        w.blank();
        match routine {
            Routine::Unpack => {
                w.open(format!(
                    "static inline void {prefix}_unpack({} *msg, const uint8_t data[{len}]) {{",
                    msg.ident
                ));
                w.line("memset(msg, 0, sizeof *msg);");
            }
            Routine::Pack => {
                w.open(format!(
                    "static inline void {prefix}_pack(const {} *msg, uint8_t data[{len}]) {{",
                    msg.ident
                ));
                w.line(format!("memset(data, 0, {});", msg.plan.byte_length));
            }
        }
        if msg.fields.is_empty() {
            w.line(match routine {
                Routine::Unpack => "(void)data;",
                Routine::Pack => "(void)msg;",
            });
        } else {
            w.line(format!("{} raw;", self.word()));
        }
    }

    fn end_routine(&self, w: &mut SourceWriter, _msg: &MessageView<'_>, _routine: Routine) {
        w.close("}");
    }

    fn physical_getter(&self, w: &mut SourceWriter, msg: &MessageView<'_>, field: &Field<'_>, expr: &str) {
        let real = if self.word_bits() < 64 { "float" } else { "double" };
        w.blank();
        w.open(format!(
            "static inline {real} {}_{}_physical(const {} *msg) {{",
            Self::prefix(msg),
            field.ident,
            msg.ident
        ));
        w.line(format!("return {expr};"));
        w.close("}");
    }

    fn end_message(&self, _w: &mut SourceWriter, _msg: &MessageView<'_>) {}
}
