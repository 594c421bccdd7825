//! Recursive-descent DBC parser.
//!
//! Statements are recognised by their leading keyword. A malformed statement
//! is reported and skipped up to the next line that starts with a section
//! keyword; a malformed `SG_` line only loses that signal.

use log::{debug, warn};

use crate::core::cursor::{Parsed, TokenCursor};
use crate::core::lexer::{Position, Token, TokenKind};
use crate::dbc::ast::{
    AttributeAssignment, AttributeDef, AttributeDefault, AttributeKindDef, AttributeLiteral,
    CommentDef, DbcFile, ExtendedMux, MessageDef, MuxTag, ObjectRef, SignalDef, SignalValueType,
    TxNodesDef, ValueDescription, ValueTableDef,
};
use crate::types::attributes::AttrObject;
use crate::types::errors::{LexError, ParseError};
use crate::types::signal::ByteOrder;

/// Keywords introducing a parsed top-level statement.
const SECTION_KEYWORDS: &[&str] = &[
    "VERSION",
    "NS_",
    "BS_",
    "BU_",
    "VAL_TABLE_",
    "BO_",
    "BO_TX_BU_",
    "CM_",
    "BA_DEF_",
    "BA_DEF_DEF_",
    "BA_",
    "VAL_",
    "SIG_VALTYPE_",
    "SG_MUL_VAL_",
];

/// Known statements without counterpart in the network model, skipped to their `;`.
const SKIPPED_KEYWORDS: &[&str] = &[
    "EV_",
    "ENVVAR_DATA_",
    "EV_DATA_",
    "SGTYPE_",
    "SGTYPE_VAL_",
    "BA_DEF_SGTYPE_",
    "BA_SGTYPE_",
    "SIG_TYPE_REF_",
    "SIG_GROUP_",
    "SIGTYPE_VALTYPE_",
    "BA_DEF_REL_",
    "BA_REL_",
    "BA_DEF_DEF_REL_",
    "BU_SG_REL_",
    "BU_EV_REL_",
    "BU_BO_REL_",
    "CAT_DEF_",
    "CAT_",
    "FILTER",
    "NS_DESC_",
];

fn is_section_start(token: &Token) -> bool {
    token.kind == TokenKind::Ident
        && (SECTION_KEYWORDS.contains(&token.text.as_str())
            || SKIPPED_KEYWORDS.contains(&token.text.as_str()))
}

/// Parses a DBC token stream.
///
/// Fails only when the input holds tokens but not a single recognizable
/// section; every other problem is collected in the returned diagnostics.
pub fn parse<T>(tokens: T) -> Result<Parsed<DbcFile>, ParseError>
where
    T: IntoIterator<Item = Result<Token, LexError>>,
{
    let mut parser = Parser {
        cur: TokenCursor::new(tokens),
        file: DbcFile::default(),
        sections: 0,
        first_error: None,
    };
    let empty = parser.cur.at_eof();
    parser.run();

    if !empty && parser.sections == 0 {
        return Err(parser
            .first_error
            .unwrap_or_else(|| ParseError::new(Position::new(1, 1), "DBC section keyword", "nothing")));
    }
    debug!(
        "parsed DBC: {} messages, {} nodes, {} diagnostics",
        parser.file.messages.len(),
        parser.file.nodes.len(),
        parser.cur.diagnostics.len()
    );
    Ok(Parsed {
        ast: parser.file,
        diagnostics: parser.cur.diagnostics,
    })
}

/// Tokenizes and parses DBC text.
pub fn parse_str(text: &str) -> Result<Parsed<DbcFile>, ParseError> {
    parse(crate::core::lexer::tokenize(text))
}

struct Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    cur: TokenCursor<I>,
    file: DbcFile,
    sections: usize,
    first_error: Option<ParseError>,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    fn run(&mut self) {
        while !self.cur.at_eof() {
            let start = self.cur.position();
            if let Err(e) = self.statement() {
                self.report(e);
                self.recover(start, |c| is_section_start(c.peek()));
            }
        }
    }

    fn report(&mut self, e: ParseError) {
        warn!("DBC {}", e);
        if self.first_error.is_none() {
            self.first_error = Some(e.clone());
        }
        self.cur.diagnostics.push(e);
    }

    /// Skips to the next line starting with a token accepted by `boundary`,
    /// always making progress.
    fn recover(&mut self, start: Position, boundary: impl Fn(&TokenCursor<I>) -> bool) {
        if self.cur.position() == start {
            self.cur.bump();
        }
        self.cur
            .skip_until(|c| c.at_line_start() && boundary(c));
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        if !self.cur.at(TokenKind::Ident) {
            return Err(self.cur.error("DBC section keyword"));
        }
        let keyword = self.cur.peek().text.clone();
        match keyword.as_str() {
            "VERSION" => self.version()?,
            "NS_" => self.new_symbols()?,
            "BS_" => self.bit_timing()?,
            "BU_" => self.nodes()?,
            "VAL_TABLE_" => self.value_table()?,
            "BO_" => self.message()?,
            "BO_TX_BU_" => self.tx_nodes()?,
            "CM_" => self.comment()?,
            "BA_DEF_" => self.attribute_def()?,
            "BA_DEF_DEF_" => self.attribute_default()?,
            "BA_" => self.attribute_value()?,
            "VAL_" => self.value_description()?,
            "SIG_VALTYPE_" => self.signal_value_type()?,
            "SG_MUL_VAL_" => self.extended_mux()?,
            k if SKIPPED_KEYWORDS.contains(&k) => {
                debug!("skipping DBC statement {} at {}", k, self.cur.position());
                self.cur.skip_past(TokenKind::Semicolon);
            }
            _ => return Err(self.cur.error("DBC section keyword")),
        }
        self.sections += 1;
        Ok(())
    }

    // --- scalar helpers ---

    fn u32(&mut self) -> Result<u32, ParseError> {
        let pos = self.cur.position();
        let v = self.cur.uint()?;
        u32::try_from(v).map_err(|_| ParseError::new(pos, "32-bit integer", v.to_string()))
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        let pos = self.cur.position();
        let v = self.cur.uint()?;
        u16::try_from(v).map_err(|_| ParseError::new(pos, "16-bit integer", v.to_string()))
    }

    /// Identifier that must continue the current line.
    fn line_ident(&mut self, what: &str) -> Result<String, ParseError> {
        if self.cur.at_line_start() || !self.cur.at(TokenKind::Ident) {
            return Err(self.cur.error(what));
        }
        Ok(self.cur.bump().text)
    }

    fn literal(&mut self) -> Result<AttributeLiteral, ParseError> {
        if self.cur.at(TokenKind::Str) {
            Ok(AttributeLiteral::Str(self.cur.string()?))
        } else {
            Ok(AttributeLiteral::Number(self.cur.number()?))
        }
    }

    /// `<int> "<text>"` pairs up to (not including) `;`.
    fn value_entries(&mut self) -> Result<Vec<(i64, String)>, ParseError> {
        let mut entries = Vec::new();
        while !self.cur.at(TokenKind::Semicolon) {
            let value = self.cur.int()?;
            let text = self.cur.string()?;
            entries.push((value, text));
        }
        Ok(entries)
    }

    /// `BU_ <node>` / `BO_ <id>` / `SG_ <id> <signal>` / `EV_ <name>`.
    fn object_ref(&mut self) -> Result<ObjectRef, ParseError> {
        if self.cur.eat_ident("BU_") {
            Ok(ObjectRef::Node(self.cur.ident()?))
        } else if self.cur.eat_ident("BO_") {
            Ok(ObjectRef::Message(self.u32()?))
        } else if self.cur.eat_ident("SG_") {
            let id = self.u32()?;
            Ok(ObjectRef::Signal(id, self.cur.ident()?))
        } else if self.cur.eat_ident("EV_") {
            Ok(ObjectRef::EnvVar(self.cur.ident()?))
        } else {
            Err(self.cur.error("'BU_', 'BO_', 'SG_' or 'EV_'"))
        }
    }

    // --- statements ---

    fn version(&mut self) -> Result<(), ParseError> {
        self.cur.expect_ident("VERSION")?;
        self.file.version = Some(self.cur.string()?);
        Ok(())
    }

    /// `NS_ :` followed by a symbol list that runs until `BS_`/`BU_`/`BO_`.
    fn new_symbols(&mut self) -> Result<(), ParseError> {
        self.cur.expect_ident("NS_")?;
        self.cur.expect(TokenKind::Colon)?;
        while !self.cur.at_eof() {
            let boundary = self.cur.at_line_start()
                && (self.cur.at_ident("BS_") || self.cur.at_ident("BU_") || self.cur.at_ident("BO_"));
            if boundary {
                break;
            }
            let token = self.cur.bump();
            if token.kind == TokenKind::Ident {
                self.file.new_symbols.push(token.text);
            }
        }
        Ok(())
    }

    /// `BS_: [baudrate : BTR1 , BTR2]`, kept out of the model.
    fn bit_timing(&mut self) -> Result<(), ParseError> {
        self.cur.expect_ident("BS_")?;
        self.cur.expect(TokenKind::Colon)?;
        while !self.cur.at_eof() && !self.cur.at_line_start() {
            self.cur.bump();
        }
        Ok(())
    }

    fn nodes(&mut self) -> Result<(), ParseError> {
        self.cur.expect_ident("BU_")?;
        self.cur.expect(TokenKind::Colon)?;
        while self.cur.at(TokenKind::Ident) && !self.cur.at_line_start() {
            let name = self.cur.bump().text;
            self.file.nodes.push(name);
        }
        Ok(())
    }

    fn value_table(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("VAL_TABLE_")?.pos;
        let name = self.cur.ident()?;
        let entries = self.value_entries()?;
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.value_tables.push(ValueTableDef { name, entries, pos });
        Ok(())
    }

    fn message(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("BO_")?.pos;
        let raw_id = self.u32()?;
        let name = self.cur.ident()?;
        self.cur.expect(TokenKind::Colon)?;
        let dlc = self.u16()?;
        let transmitter = self.line_ident("transmitter node")?;

        let mut message = MessageDef {
            raw_id,
            name,
            dlc,
            transmitter,
            signals: Vec::new(),
            pos,
        };
        while self.cur.at_ident("SG_") {
            let start = self.cur.position();
            match self.signal() {
                Ok(signal) => message.signals.push(signal),
                Err(e) => {
                    self.report(e);
                    self.recover(start, |c| c.at_ident("SG_") || is_section_start(c.peek()));
                }
            }
        }
        self.file.messages.push(message);
        Ok(())
    }

    fn mux_tag(&mut self) -> Result<MuxTag, ParseError> {
        if !self.cur.at(TokenKind::Ident) {
            return Ok(MuxTag::None);
        }
        let token = self.cur.bump();
        let text = token.text.as_str();
        if text == "M" {
            return Ok(MuxTag::Multiplexor);
        }
        if let Some(rest) = text.strip_prefix('m') {
            let (digits, switch) = match rest.strip_suffix('M') {
                Some(d) => (d, true),
                None => (rest, false),
            };
            if let Ok(value) = digits.parse::<u64>() {
                return Ok(if switch {
                    MuxTag::MultiplexedMultiplexor(value)
                } else {
                    MuxTag::Multiplexed(value)
                });
            }
        }
        Err(ParseError::new(
            token.pos,
            "multiplexer indicator 'M', 'mN' or 'mNM'",
            token.describe(),
        ))
    }

    fn signal(&mut self) -> Result<SignalDef, ParseError> {
        let pos = self.cur.expect_ident("SG_")?.pos;
        let name = self.cur.ident()?;
        let mux = self.mux_tag()?;
        self.cur.expect(TokenKind::Colon)?;
        let start_bit = self.u16()?;
        self.cur.expect(TokenKind::Pipe)?;
        let width = self.u16()?;

        let (byte_order, signed) = if self.cur.eat(TokenKind::At).is_some() {
            let order_pos = self.cur.position();
            let byte_order = match self.cur.uint()? {
                0 => ByteOrder::BigEndian,
                1 => ByteOrder::LittleEndian,
                other => {
                    return Err(ParseError::new(order_pos, "byte order 0 or 1", other.to_string()));
                }
            };
            let signed = if self.cur.eat(TokenKind::Minus).is_some() {
                true
            } else if self.cur.eat(TokenKind::Plus).is_some() {
                false
            } else {
                return Err(self.cur.error("'+' or '-'"));
            };
            (Some(byte_order), signed)
        } else {
            (None, false)
        };

        self.cur.expect(TokenKind::LParen)?;
        let scale = self.cur.number()?;
        self.cur.expect(TokenKind::Comma)?;
        let offset = self.cur.number()?;
        self.cur.expect(TokenKind::RParen)?;

        self.cur.expect(TokenKind::LBracket)?;
        let min = self.cur.number()?;
        self.cur.expect(TokenKind::Pipe)?;
        let max = self.cur.number()?;
        self.cur.expect(TokenKind::RBracket)?;

        let unit = self.cur.string()?;

        let mut receivers = Vec::new();
        while !self.cur.at_line_start() {
            if self.cur.eat(TokenKind::Comma).is_some() {
                continue;
            }
            if !self.cur.at(TokenKind::Ident) {
                break;
            }
            receivers.push(self.cur.bump().text);
        }

        Ok(SignalDef {
            name,
            mux,
            start_bit,
            width,
            byte_order,
            signed,
            scale,
            offset,
            min,
            max,
            unit,
            receivers,
            pos,
        })
    }

    fn tx_nodes(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("BO_TX_BU_")?.pos;
        let raw_id = self.u32()?;
        self.cur.expect(TokenKind::Colon)?;
        let mut nodes = Vec::new();
        while !self.cur.at(TokenKind::Semicolon) {
            if self.cur.eat(TokenKind::Comma).is_some() {
                continue;
            }
            nodes.push(self.cur.ident()?);
        }
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.tx_nodes.push(TxNodesDef { raw_id, nodes, pos });
        Ok(())
    }

    fn comment(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("CM_")?.pos;
        let target = if self.cur.at(TokenKind::Str) {
            ObjectRef::Network
        } else {
            self.object_ref()?
        };
        let text = self.cur.string()?;
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.comments.push(CommentDef { target, text, pos });
        Ok(())
    }

    fn attribute_def(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("BA_DEF_")?.pos;
        let object = if self.cur.eat_ident("BU_") {
            Some(AttrObject::Node)
        } else if self.cur.eat_ident("BO_") {
            Some(AttrObject::Message)
        } else if self.cur.eat_ident("SG_") {
            Some(AttrObject::Signal)
        } else if self.cur.eat_ident("EV_") {
            None
        } else {
            Some(AttrObject::Network)
        };
        let name = self.cur.string()?;

        let kind_token = self.cur.expect(TokenKind::Ident)?;
        let kind = match kind_token.text.as_str() {
            "INT" => AttributeKindDef::Int {
                min: self.cur.number()? as i64,
                max: self.cur.number()? as i64,
            },
            "HEX" => AttributeKindDef::Hex {
                min: self.cur.number()? as u64,
                max: self.cur.number()? as u64,
            },
            "FLOAT" => AttributeKindDef::Float {
                min: self.cur.number()?,
                max: self.cur.number()?,
            },
            "STRING" => AttributeKindDef::String,
            "ENUM" => {
                let mut values = Vec::new();
                while !self.cur.at(TokenKind::Semicolon) {
                    if self.cur.eat(TokenKind::Comma).is_some() {
                        continue;
                    }
                    values.push(self.cur.string()?);
                }
                AttributeKindDef::Enum(values)
            }
            _ => {
                return Err(ParseError::new(
                    kind_token.pos,
                    "INT, HEX, FLOAT, STRING or ENUM",
                    kind_token.describe(),
                ));
            }
        };
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.attribute_defs.push(AttributeDef {
            object,
            name,
            kind,
            pos,
        });
        Ok(())
    }

    fn attribute_default(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("BA_DEF_DEF_")?.pos;
        let name = self.cur.string()?;
        let value = self.literal()?;
        self.cur.expect(TokenKind::Semicolon)?;
        self.file
            .attribute_defaults
            .push(AttributeDefault { name, value, pos });
        Ok(())
    }

    fn attribute_value(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("BA_")?.pos;
        let name = self.cur.string()?;
        let target = if self.cur.at(TokenKind::Ident) {
            self.object_ref()?
        } else {
            ObjectRef::Network
        };
        let value = self.literal()?;
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.attribute_values.push(AttributeAssignment {
            name,
            target,
            value,
            pos,
        });
        Ok(())
    }

    fn value_description(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("VAL_")?.pos;
        let target = if self.cur.at(TokenKind::Int) {
            let id = self.u32()?;
            ObjectRef::Signal(id, self.cur.ident()?)
        } else {
            ObjectRef::EnvVar(self.cur.ident()?)
        };
        let entries = self.value_entries()?;
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.value_descriptions.push(ValueDescription {
            target,
            entries,
            pos,
        });
        Ok(())
    }

    fn signal_value_type(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("SIG_VALTYPE_")?.pos;
        let raw_id = self.u32()?;
        let signal = self.cur.ident()?;
        self.cur.eat(TokenKind::Colon);
        let code_pos = self.cur.position();
        let code = match self.cur.uint()? {
            c @ 0..=2 => c as u8,
            other => return Err(ParseError::new(code_pos, "value type 0, 1 or 2", other.to_string())),
        };
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.signal_value_types.push(SignalValueType {
            raw_id,
            signal,
            code,
            pos,
        });
        Ok(())
    }

    fn extended_mux(&mut self) -> Result<(), ParseError> {
        let pos = self.cur.expect_ident("SG_MUL_VAL_")?.pos;
        let raw_id = self.u32()?;
        let signal = self.cur.ident()?;
        let switch = self.cur.ident()?;
        let mut ranges = Vec::new();
        loop {
            let lo = self.cur.uint()?;
            self.cur.expect(TokenKind::Minus)?;
            let hi = self.cur.uint()?;
            ranges.push((lo, hi));
            if self.cur.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.cur.expect(TokenKind::Semicolon)?;
        self.file.extended_mux.push(ExtendedMux {
            raw_id,
            signal,
            switch,
            ranges,
            pos,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::diagnostics::Diagnostic;

    const SAMPLE: &str = r#"VERSION "1.0"

NS_ :
	NS_DESC_
	CM_
	BA_DEF_
	VAL_TABLE_

BS_:

BU_: ECU ABS Gateway

VAL_TABLE_ OnOff 1 "On" 0 "Off" ;

BO_ 256 EngineData: 8 ECU
 SG_ Speed : 0|16@1+ (0.1,0) [0|6553.5] "km/h"  ABS,Gateway
 SG_ Temp : 23|8@0- (1,-40) [-40|215] "degC" Vector__XXX

BO_ 2147484672 ExtFrame: 8 Gateway
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ABS
 SG_ A m0 : 8|8@1+ (1,0) [0|255] "" ABS
 SG_ B m1 : 8|8@1+ (1,0) [0|255] "" ABS

BO_TX_BU_ 256 : ECU,Gateway;

CM_ "Demo network";
CM_ BO_ 256 "Engine \"main\" data";
CM_ SG_ 256 Speed "Vehicle speed";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_DEF_ "BusType" STRING ;
BA_DEF_ SG_ "SigKind" ENUM "Plain","Fancy";
BA_DEF_DEF_ "GenMsgCycleTime" 100;
BA_ "BusType" "CAN";
BA_ "GenMsgCycleTime" BO_ 256 20;
VAL_ 256 Temp -40 "Cold" 215 "Hot" ;
SIG_VALTYPE_ 256 Speed : 0;
SG_MUL_VAL_ 2147484672 B Mode 1-1, 4-6;
EV_ Dummy: 0 [0|0] "" 0 1 DUMMY_NODE_VECTOR0 Vector__XXX;
"#;

    #[test]
    fn test_parse_sample() {
        let parsed = parse_str(SAMPLE).unwrap();
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let f = parsed.ast;

        assert_eq!(f.version.as_deref(), Some("1.0"));
        assert_eq!(f.new_symbols, vec!["NS_DESC_", "CM_", "BA_DEF_", "VAL_TABLE_"]);
        assert_eq!(f.nodes, vec!["ECU", "ABS", "Gateway"]);
        assert_eq!(f.value_tables[0].entries, vec![(1, "On".into()), (0, "Off".into())]);

        assert_eq!(f.messages.len(), 2);
        let engine = &f.messages[0];
        assert_eq!((engine.raw_id, engine.dlc), (256, 8));
        assert_eq!(engine.transmitter, "ECU");
        let speed = &engine.signals[0];
        assert_eq!(speed.byte_order, Some(ByteOrder::LittleEndian));
        assert_eq!((speed.start_bit, speed.width), (0, 16));
        assert_eq!(speed.scale, 0.1);
        assert_eq!(speed.receivers, vec!["ABS", "Gateway"]);
        let temp = &engine.signals[1];
        assert!(temp.signed);
        assert_eq!(temp.byte_order, Some(ByteOrder::BigEndian));
        assert_eq!(temp.offset, -40.0);
        assert_eq!(temp.min, -40.0);
        assert_eq!(temp.receivers, vec!["Vector__XXX"]);

        let ext = &f.messages[1];
        assert_eq!(ext.raw_id, 0x8000_0400);
        assert_eq!(ext.signals[0].mux, MuxTag::Multiplexor);
        assert_eq!(ext.signals[1].mux, MuxTag::Multiplexed(0));
        assert_eq!(ext.signals[2].mux, MuxTag::Multiplexed(1));

        assert_eq!(f.tx_nodes[0].nodes, vec!["ECU", "Gateway"]);
        assert_eq!(f.comments.len(), 3);
        assert_eq!(f.comments[1].text, "Engine \"main\" data");
        assert_eq!(f.comments[2].target, ObjectRef::Signal(256, "Speed".into()));
        assert_eq!(f.attribute_defs.len(), 3);
        assert_eq!(
            f.attribute_defs[2].kind,
            AttributeKindDef::Enum(vec!["Plain".into(), "Fancy".into()])
        );
        assert_eq!(f.attribute_defaults[0].value, AttributeLiteral::Number(100.0));
        assert_eq!(f.attribute_values[1].target, ObjectRef::Message(256));
        assert_eq!(f.value_descriptions[0].entries[0], (-40, "Cold".into()));
        assert_eq!(f.signal_value_types[0].code, 0);
        assert_eq!(f.extended_mux[0].ranges, vec![(1, 1), (4, 6)]);
    }

    #[test]
    fn test_mux_tags() {
        let text = "BO_ 1 M: 8 X\n SG_ S m2M : 0|4@1+ (1,0) [0|15] \"\" X\n SG_ T m12 : 4|4@1+ (1,0) [0|15] \"\" X\n";
        let f = parse_str(text).unwrap().ast;
        assert_eq!(f.messages[0].signals[0].mux, MuxTag::MultiplexedMultiplexor(2));
        assert_eq!(f.messages[0].signals[1].mux, MuxTag::Multiplexed(12));
    }

    #[test]
    fn test_missing_byte_order_clause() {
        let text = "BO_ 1 M: 8 X\n SG_ S : 0|4 (1,0) [0|15] \"\" X\n";
        let f = parse_str(text).unwrap().ast;
        assert_eq!(f.messages[0].signals[0].byte_order, None);
    }

    #[test]
    fn test_bad_signal_line_is_skipped() {
        let text = "BO_ 1 M: 8 X\n SG_ A : 0|4@1+ (1,0) [0|15] \"\" X\n SG_ B : 4|@1+ (1,0) [0|15] \"\" X\n SG_ C : 8|4@1+ (1,0) [0|15] \"\" X\nBO_ 2 N: 8 X\n";
        let parsed = parse_str(text).unwrap();
        let names: Vec<&str> = parsed.ast.messages[0]
            .signals
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(parsed.ast.messages.len(), 2);
        assert_eq!(parsed.diagnostics.len(), 1);
        match parsed.diagnostics.iter().next() {
            Some(Diagnostic::Parse(e)) => {
                assert_eq!(e.position, Position::new(3, 12));
                assert_eq!(e.expected, "integer");
                assert_eq!(e.found, "'@'");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn test_bad_section_recovers_at_next_keyword() {
        let text = "BO_ 1 : 8 X\n SG_ A : 0|4@1+ (1,0) [0|15] \"\" X\nBO_ 2 Good: 8 X\nGARBAGE here\nCM_ \"ok\";\n";
        let parsed = parse_str(text).unwrap();
        assert_eq!(parsed.ast.messages.len(), 1);
        assert_eq!(parsed.ast.messages[0].name, "Good");
        assert_eq!(parsed.ast.comments.len(), 1);
        assert_eq!(parsed.diagnostics.len(), 2);
    }

    #[test]
    fn test_unrecognizable_input_is_fatal() {
        let err = parse_str("hello world").unwrap_err();
        assert_eq!(err.position, Position::new(1, 1));
        assert_eq!(err.expected, "DBC section keyword");
        assert!(parse_str("").is_ok());
        assert!(parse_str("// only a comment\n").is_ok());
    }

    #[test]
    fn test_lex_errors_do_not_stop_parsing() {
        let parsed = parse_str("BU_: A $ B\nBO_ 1 M: 8 A\n").unwrap();
        assert_eq!(parsed.ast.nodes, vec!["A", "B"]);
        assert!(matches!(
            parsed.diagnostics.iter().next(),
            Some(Diagnostic::Lex(LexError::UnexpectedChar { found: '$', .. }))
        ));
    }
}
