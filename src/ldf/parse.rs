//! Recursive-descent LDF parser.
//!
//! An LDF file is a header followed by `key = value;` statements and named
//! `{ ... }` sections. A malformed entry inside a section is reported and
//! skipped up to its terminating `;` (or past the nested block it opened);
//! unknown sections are skipped whole. Only a missing header or the end of
//! input inside an open `{` aborts the parse.
//!
//! [`LinParser`] holds the block machinery and the entry grammar shared with
//! the NCF parser (encoding types, init values, byte lists).

use log::{debug, warn};

use crate::core::cursor::{Parsed, TokenCursor};
use crate::core::lexer::{Position, Token, TokenKind};
use crate::ldf::ast::{
    EncodingTypeDef, EventTriggeredFrameDef, FrameDef, FrameSignalDef, LdfFile, MasterDef,
    NodeAttributesDef, RepresentationDef, ScheduleTableDef, SignalDef, SporadicFrameDef,
};
use crate::types::errors::{LexError, ParseError};
use crate::types::lin::{EncodingValue, PhysicalRange};
use crate::types::node::ProductId;
use crate::types::schedule::{ScheduleCommand, ScheduleEntry};
use crate::types::signal::InitValue;

/// Protocol and language versions accepted without a warning.
pub const KNOWN_LIN_VERSIONS: &[&str] = &["1.3", "2.0", "2.1", "2.2", "ISO17987:2015", "J2602_1_1.0"];

/// Parses an LDF token stream.
pub fn parse<T>(tokens: T) -> Result<Parsed<LdfFile>, ParseError>
where
    T: IntoIterator<Item = Result<Token, LexError>>,
{
    let mut parser = Parser {
        lin: LinParser::new(tokens, "LDF"),
        file: LdfFile::default(),
    };
    parser.lin.header("LIN_description_file")?;
    parser.run();
    if let Some(fatal) = parser.lin.fatal.take() {
        return Err(fatal);
    }
    debug!(
        "parsed LDF: {} signals, {} frames, {} schedule tables, {} diagnostics",
        parser.file.signals.len(),
        parser.file.frames.len(),
        parser.file.schedule_tables.len(),
        parser.lin.cur.diagnostics.len()
    );
    Ok(Parsed {
        ast: parser.file,
        diagnostics: parser.lin.cur.diagnostics,
    })
}

/// Tokenizes and parses LDF text.
pub fn parse_str(text: &str) -> Result<Parsed<LdfFile>, ParseError> {
    parse(crate::core::lexer::tokenize(text))
}

/// Block-structured grammar shared by LDF and NCF.
pub(crate) struct LinParser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub cur: TokenCursor<I>,
    format: &'static str,
    /// Set once the input ends inside an open block.
    pub fatal: Option<ParseError>,
}

impl<I> LinParser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub fn new(tokens: impl IntoIterator<IntoIter = I>, format: &'static str) -> Self {
        LinParser {
            cur: TokenCursor::new(tokens),
            format,
            fatal: None,
        }
    }

    /// `<keyword> ;` opening the file.
    pub fn header(&mut self, keyword: &str) -> Result<(), ParseError> {
        self.cur.expect_ident(keyword)?;
        self.cur.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    pub fn report(&mut self, e: ParseError) {
        warn!("{} {}", self.format, e);
        self.cur.diagnostics.push(e);
    }

    fn unclosed(&mut self, name: &str, open: Position) -> ParseError {
        let e = ParseError::new(
            self.cur.position(),
            format!("'}}' closing {} opened at {}", name, open),
            "end of file",
        );
        self.fatal = Some(e.clone());
        e
    }

    /// Runs `item` for every entry of a `{ ... }` block, recovering from
    /// malformed entries. End of input before the closing brace is fatal.
    pub fn block(
        &mut self,
        name: &str,
        mut item: impl FnMut(&mut Self) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        let open = self.cur.expect(TokenKind::LBrace)?.pos;
        loop {
            if self.cur.eat(TokenKind::RBrace).is_some() {
                return Ok(());
            }
            if self.cur.at_eof() {
                return Err(self.unclosed(name, open));
            }
            let start = self.cur.position();
            if let Err(e) = item(self) {
                if let Some(fatal) = &self.fatal {
                    return Err(fatal.clone());
                }
                self.report(e);
                self.recover(start);
            }
        }
    }

    /// Skips a whole `{ ... }` block, nested braces included.
    pub fn skip_block(&mut self, name: &str) -> Result<(), ParseError> {
        let open = self.cur.expect(TokenKind::LBrace)?.pos;
        let mut depth = 1usize;
        while depth > 0 {
            match self.cur.bump().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => return Err(self.unclosed(name, open)),
                _ => {}
            }
        }
        Ok(())
    }

    /// Skips the rest of a malformed entry: up to and including its `;`, or
    /// past a nested block it opened. Stops before the brace closing the
    /// enclosing block.
    pub fn recover(&mut self, start: Position) {
        let mut depth = 0usize;
        if self.cur.position() == start {
            match self.cur.bump().kind {
                TokenKind::LBrace => depth = 1,
                TokenKind::Semicolon => return,
                _ => {}
            }
        }
        while !self.cur.at_eof() {
            match self.cur.peek().kind {
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::RBrace => {
                    self.cur.bump();
                    depth -= 1;
                    if depth == 0 {
                        self.cur.eat(TokenKind::Semicolon);
                        return;
                    }
                }
                TokenKind::LBrace => {
                    self.cur.bump();
                    depth += 1;
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.cur.bump();
                    return;
                }
                _ => {
                    self.cur.bump();
                }
            }
        }
    }

    /// Skips a section (`name { ... }`) or statement (`name = ...;`) this
    /// parser does not model. Skipped sections are reported as warnings.
    pub fn skip_unknown(&mut self, name: &str, pos: Position) -> Result<(), ParseError> {
        match self.cur.peek().kind {
            TokenKind::LBrace => {
                self.cur.diagnostics.warn(
                    Some(pos),
                    format!("skipping unknown {} section '{}'", self.format, name),
                );
                self.skip_block(name)
            }
            TokenKind::Equals | TokenKind::Semicolon => {
                debug!("skipping {} statement '{}' at {}", self.format, name, pos);
                self.cur.skip_past(TokenKind::Semicolon);
                Ok(())
            }
            _ => Err(ParseError::new(
                pos,
                format!("{} section or statement", self.format),
                format!("'{}'", name),
            )),
        }
    }

    /// `{ ... }` argument list parsed by `f`. On error the list is skipped.
    pub fn braced<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        self.cur.expect(TokenKind::LBrace)?;
        let result = f(self);
        let result = match result {
            Ok(value) => self.cur.expect(TokenKind::RBrace).map(|_| value),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.cur
                .skip_until(|c| c.at(TokenKind::RBrace) || c.at(TokenKind::Semicolon));
            self.cur.eat(TokenKind::RBrace);
        }
        result
    }

    // --- scalars ---

    pub fn byte(&mut self) -> Result<u8, ParseError> {
        let pos = self.cur.position();
        let v = self.cur.uint()?;
        u8::try_from(v).map_err(|_| ParseError::new(pos, "byte value", v.to_string()))
    }

    pub fn u16(&mut self) -> Result<u16, ParseError> {
        let pos = self.cur.position();
        let v = self.cur.uint()?;
        u16::try_from(v).map_err(|_| ParseError::new(pos, "16-bit integer", v.to_string()))
    }

    pub fn u32(&mut self) -> Result<u32, ParseError> {
        let pos = self.cur.position();
        let v = self.cur.uint()?;
        u32::try_from(v).map_err(|_| ParseError::new(pos, "32-bit integer", v.to_string()))
    }

    /// Number followed by its unit keyword (`5 ms`, `19.2 kbps`).
    pub fn number_with_unit(&mut self, unit: &str) -> Result<f64, ParseError> {
        let value = self.cur.number()?;
        self.cur.expect_ident(unit)?;
        Ok(value)
    }

    /// `N` comma-separated bytes.
    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        for (i, slot) in out.iter_mut().enumerate() {
            if i > 0 {
                self.cur.expect(TokenKind::Comma)?;
            }
            *slot = self.byte()?;
        }
        Ok(out)
    }

    /// Version-like value: a string, a number or an identifier, as text.
    pub fn text_value(&mut self) -> Result<String, ParseError> {
        match self.cur.peek().kind {
            TokenKind::Str | TokenKind::Int | TokenKind::Float | TokenKind::Ident => {
                Ok(self.cur.bump().text)
            }
            _ => Err(self.cur.error("string")),
        }
    }

    /// `ident, ident, ... ;`, the `;` included.
    pub fn name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        while self.cur.eat(TokenKind::Semicolon).is_none() {
            if !names.is_empty() {
                self.cur.expect(TokenKind::Comma)?;
            }
            names.push(self.cur.ident()?);
        }
        Ok(names)
    }

    /// Scalar init value or `{ b0, b1, ... }` byte array.
    pub fn init_value(&mut self) -> Result<InitValue, ParseError> {
        if !self.cur.at(TokenKind::LBrace) {
            return Ok(InitValue::Scalar(self.cur.uint()?));
        }
        self.braced(|p| {
            let mut bytes = vec![p.byte()?];
            while p.cur.eat(TokenKind::Comma).is_some() {
                bytes.push(p.byte()?);
            }
            Ok(InitValue::Array(bytes))
        })
    }

    /// Warns when `version` is not a LIN version this crate knows.
    pub fn check_version(&mut self, what: &str, version: &str, pos: Position) {
        if !KNOWN_LIN_VERSIONS.contains(&version) {
            self.cur
                .diagnostics
                .warn(Some(pos), format!("unsupported {} \"{}\"", what, version));
        }
    }

    // --- encodings ---

    /// `<name> { <value>; ... }`
    pub fn encoding_type(&mut self) -> Result<EncodingTypeDef, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        let mut values = Vec::new();
        self.block("signal encoding type", |p| {
            values.push(p.encoding_value()?);
            Ok(())
        })?;
        Ok(EncodingTypeDef {
            name: token.text,
            values,
            pos: token.pos,
        })
    }

    fn encoding_value(&mut self) -> Result<EncodingValue, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        let value = match token.text.as_str() {
            "logical_value" => {
                self.cur.expect(TokenKind::Comma)?;
                let value = self.cur.uint()?;
                let text = if self.cur.eat(TokenKind::Comma).is_some() {
                    self.cur.string()?
                } else {
                    String::new()
                };
                EncodingValue::Logical { value, text }
            }
            "physical_value" => {
                self.cur.expect(TokenKind::Comma)?;
                let raw_min = self.cur.uint()?;
                self.cur.expect(TokenKind::Comma)?;
                let raw_max = self.cur.uint()?;
                self.cur.expect(TokenKind::Comma)?;
                let scale = self.cur.number()?;
                self.cur.expect(TokenKind::Comma)?;
                let offset = self.cur.number()?;
                let unit = if self.cur.eat(TokenKind::Comma).is_some() {
                    self.cur.string()?
                } else {
                    String::new()
                };
                EncodingValue::Physical(PhysicalRange {
                    raw_min,
                    raw_max,
                    scale,
                    offset,
                    unit,
                })
            }
            "bcd_value" => EncodingValue::Bcd,
            "ascii_value" => EncodingValue::Ascii,
            _ => {
                return Err(ParseError::new(
                    token.pos,
                    "logical_value, physical_value, bcd_value or ascii_value",
                    token.describe(),
                ));
            }
        };
        self.cur.expect(TokenKind::Semicolon)?;
        Ok(value)
    }

    // --- LDF entries ---

    /// `<name>: <size>, <init> [, <publisher> [, <subscriber>...]];`
    fn signal_def(&mut self) -> Result<SignalDef, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        self.cur.expect(TokenKind::Colon)?;
        let width = self.u16()?;
        self.cur.expect(TokenKind::Comma)?;
        let init = self.init_value()?;
        let mut publisher = None;
        let mut subscribers = Vec::new();
        if self.cur.eat(TokenKind::Comma).is_some() {
            publisher = Some(self.cur.ident()?);
            while self.cur.eat(TokenKind::Comma).is_some() {
                subscribers.push(self.cur.ident()?);
            }
        }
        self.cur.expect(TokenKind::Semicolon)?;
        Ok(SignalDef {
            name: token.text,
            width,
            init,
            publisher,
            subscribers,
            pos: token.pos,
        })
    }

    /// Unconditional frame, or a diagnostic frame (`<name>: <id> { ... }`).
    fn frame_def(&mut self, diagnostic: bool) -> Result<FrameDef, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        self.cur.expect(TokenKind::Colon)?;
        let id = self.u32()?;
        let mut publisher = None;
        let mut length = 8;
        if !diagnostic {
            self.cur.expect(TokenKind::Comma)?;
            publisher = Some(self.cur.ident()?);
            if self.cur.eat(TokenKind::Comma).is_some() {
                length = self.u16()?;
            }
        }
        let mut signals = Vec::new();
        self.block("frame", |p| {
            let sig = p.cur.expect(TokenKind::Ident)?;
            p.cur.expect(TokenKind::Comma)?;
            let offset = p.u16()?;
            p.cur.expect(TokenKind::Semicolon)?;
            signals.push(FrameSignalDef {
                name: sig.text,
                offset,
                pos: sig.pos,
            });
            Ok(())
        })?;
        Ok(FrameDef {
            name: token.text,
            id,
            publisher,
            length,
            signals,
            pos: token.pos,
        })
    }

    fn node_attributes(&mut self) -> Result<NodeAttributesDef, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        let mut def = NodeAttributesDef {
            node: token.text,
            pos: token.pos,
            ..Default::default()
        };
        self.block("node attributes", |p| {
            let key = p.cur.expect(TokenKind::Ident)?;
            if key.text == "configurable_frames" {
                return p.block("configurable_frames", |p| {
                    let name = p.cur.ident()?;
                    let id = match p.cur.eat(TokenKind::Equals) {
                        Some(_) => Some(p.u32()?),
                        None => None,
                    };
                    p.cur.expect(TokenKind::Semicolon)?;
                    def.configurable_frames.push((name, id));
                    Ok(())
                });
            }
            p.cur.expect(TokenKind::Equals)?;
            match key.text.as_str() {
                "LIN_protocol" => def.protocol = Some(p.text_value()?),
                "configured_NAD" => def.configured_nad = Some(p.byte()?),
                "initial_NAD" => def.initial_nad = Some(p.byte()?),
                "product_id" => {
                    let supplier_id = p.u16()?;
                    p.cur.expect(TokenKind::Comma)?;
                    let function_id = p.u16()?;
                    let variant = match p.cur.eat(TokenKind::Comma) {
                        Some(_) => Some(p.byte()?),
                        None => None,
                    };
                    def.product_id = Some(ProductId {
                        supplier_id,
                        function_id,
                        variant,
                    });
                }
                "response_error" => def.response_error = Some(p.cur.ident()?),
                "fault_state_signals" => {
                    def.fault_state_signals.push(p.cur.ident()?);
                    while p.cur.eat(TokenKind::Comma).is_some() {
                        def.fault_state_signals.push(p.cur.ident()?);
                    }
                }
                "P2_min" => def.p2_min_ms = Some(p.number_with_unit("ms")?),
                "ST_min" => def.st_min_ms = Some(p.number_with_unit("ms")?),
                "N_As_timeout" => def.n_as_timeout_ms = Some(p.number_with_unit("ms")?),
                "N_Cr_timeout" => def.n_cr_timeout_ms = Some(p.number_with_unit("ms")?),
                other => {
                    debug!("skipping node attribute '{}' at {}", other, key.pos);
                    p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
                }
            }
            p.cur.expect(TokenKind::Semicolon)?;
            Ok(())
        })?;
        Ok(def)
    }

    fn schedule_table(&mut self) -> Result<ScheduleTableDef, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        let mut entries = Vec::new();
        self.block("schedule table", |p| {
            let command = p.schedule_command()?;
            p.cur.expect_ident("delay")?;
            let delay_ms = p.number_with_unit("ms")?;
            p.cur.expect(TokenKind::Semicolon)?;
            entries.push(ScheduleEntry { command, delay_ms });
            Ok(())
        })?;
        Ok(ScheduleTableDef {
            name: token.text,
            entries,
            pos: token.pos,
        })
    }

    fn schedule_command(&mut self) -> Result<ScheduleCommand, ParseError> {
        let token = self.cur.expect(TokenKind::Ident)?;
        let command = match token.text.as_str() {
            "MasterReq" => ScheduleCommand::MasterReq,
            "SlaveResp" => ScheduleCommand::SlaveResp,
            "AssignNAD" => self.braced(|p| {
                Ok(ScheduleCommand::AssignNad {
                    node: p.cur.ident()?,
                })
            })?,
            "ConditionalChangeNAD" => self.braced(|p| {
                let [nad, id, byte, mask, inv, new_nad] = p.bytes::<6>()?;
                Ok(ScheduleCommand::ConditionalChangeNad {
                    nad,
                    id,
                    byte,
                    mask,
                    inv,
                    new_nad,
                })
            })?,
            "DataDump" => self.braced(|p| {
                let node = p.cur.ident()?;
                p.cur.expect(TokenKind::Comma)?;
                Ok(ScheduleCommand::DataDump {
                    node,
                    data: p.bytes::<5>()?,
                })
            })?,
            "SaveConfiguration" => self.braced(|p| {
                Ok(ScheduleCommand::SaveConfiguration {
                    node: p.cur.ident()?,
                })
            })?,
            "AssignFrameIdRange" => self.braced(|p| {
                let node = p.cur.ident()?;
                p.cur.expect(TokenKind::Comma)?;
                let index = p.byte()?;
                let mut pids = Vec::new();
                while p.cur.eat(TokenKind::Comma).is_some() {
                    pids.push(p.byte()?);
                }
                Ok(ScheduleCommand::AssignFrameIdRange { node, index, pids })
            })?,
            "FreeFormat" => self.braced(|p| {
                Ok(ScheduleCommand::FreeFormat {
                    data: p.bytes::<8>()?,
                })
            })?,
            "AssignFrameId" => self.braced(|p| {
                let node = p.cur.ident()?;
                p.cur.expect(TokenKind::Comma)?;
                Ok(ScheduleCommand::AssignFrameId {
                    node,
                    frame: p.cur.ident()?,
                })
            })?,
            _ => ScheduleCommand::Frame(token.text),
        };
        Ok(command)
    }
}

struct Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    lin: LinParser<I>,
    file: LdfFile,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    fn run(&mut self) {
        while !self.lin.cur.at_eof() {
            let start = self.lin.cur.position();
            if let Err(e) = self.statement() {
                if self.lin.fatal.is_some() {
                    return;
                }
                self.lin.report(e);
                self.lin.recover(start);
            }
        }
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        let token = self.lin.cur.expect(TokenKind::Ident)?;
        match token.text.as_str() {
            "LIN_protocol_version" => {
                let version = self.version_value("LIN protocol version")?;
                self.file.protocol_version = version;
            }
            "LIN_language_version" => {
                let version = self.version_value("LIN language version")?;
                self.file.language_version = version;
            }
            "LIN_speed" => {
                self.lin.cur.expect(TokenKind::Equals)?;
                self.file.speed_kbps = self.lin.number_with_unit("kbps")?;
                self.lin.cur.expect(TokenKind::Semicolon)?;
            }
            "Channel_name" => {
                self.lin.cur.expect(TokenKind::Equals)?;
                self.file.channel_name = Some(self.lin.text_value()?);
                self.lin.cur.expect(TokenKind::Semicolon)?;
            }
            "Nodes" => self.nodes()?,
            "Signals" => self.lin.block("Signals", |p| {
                let signal = p.signal_def()?;
                self.file.signals.push(signal);
                Ok(())
            })?,
            "Diagnostic_signals" => self.lin.block("Diagnostic_signals", |p| {
                let signal = p.signal_def()?;
                self.file.diagnostic_signals.push(signal);
                Ok(())
            })?,
            "Frames" => self.lin.block("Frames", |p| {
                let frame = p.frame_def(false)?;
                self.file.frames.push(frame);
                Ok(())
            })?,
            "Sporadic_frames" => self.lin.block("Sporadic_frames", |p| {
                let token = p.cur.expect(TokenKind::Ident)?;
                p.cur.expect(TokenKind::Colon)?;
                let frames = p.name_list()?;
                self.file.sporadic_frames.push(SporadicFrameDef {
                    name: token.text,
                    frames,
                    pos: token.pos,
                });
                Ok(())
            })?,
            "Event_triggered_frames" => self.lin.block("Event_triggered_frames", |p| {
                let token = p.cur.expect(TokenKind::Ident)?;
                p.cur.expect(TokenKind::Colon)?;
                let collision_schedule = if p.cur.at(TokenKind::Ident) {
                    let name = p.cur.ident()?;
                    p.cur.expect(TokenKind::Comma)?;
                    Some(name)
                } else {
                    None
                };
                let id = p.u32()?;
                let frames = match p.cur.eat(TokenKind::Comma) {
                    Some(_) => p.name_list()?,
                    None => {
                        p.cur.expect(TokenKind::Semicolon)?;
                        Vec::new()
                    }
                };
                self.file.event_triggered_frames.push(EventTriggeredFrameDef {
                    name: token.text,
                    collision_schedule,
                    id,
                    frames,
                    pos: token.pos,
                });
                Ok(())
            })?,
            "Diagnostic_frames" => self.lin.block("Diagnostic_frames", |p| {
                let frame = p.frame_def(true)?;
                self.file.diagnostic_frames.push(frame);
                Ok(())
            })?,
            "Node_attributes" => self.lin.block("Node_attributes", |p| {
                let attrs = p.node_attributes()?;
                self.file.node_attributes.push(attrs);
                Ok(())
            })?,
            "Schedule_tables" => self.lin.block("Schedule_tables", |p| {
                let table = p.schedule_table()?;
                self.file.schedule_tables.push(table);
                Ok(())
            })?,
            "Signal_encoding_types" => self.lin.block("Signal_encoding_types", |p| {
                let encoding = p.encoding_type()?;
                self.file.encoding_types.push(encoding);
                Ok(())
            })?,
            "Signal_representation" => self.lin.block("Signal_representation", |p| {
                let token = p.cur.expect(TokenKind::Ident)?;
                p.cur.expect(TokenKind::Colon)?;
                let signals = p.name_list()?;
                self.file.representations.push(RepresentationDef {
                    encoding: token.text,
                    signals,
                    pos: token.pos,
                });
                Ok(())
            })?,
            other => self.lin.skip_unknown(other, token.pos)?,
        }
        Ok(())
    }

    fn version_value(&mut self, what: &str) -> Result<String, ParseError> {
        self.lin.cur.expect(TokenKind::Equals)?;
        let pos = self.lin.cur.position();
        let version = self.lin.text_value()?;
        self.lin.cur.expect(TokenKind::Semicolon)?;
        self.lin.check_version(what, &version, pos);
        Ok(version)
    }

    /// `Nodes { Master: <name>, <time base> ms, <jitter> ms; Slaves: <name>, ...; }`
    fn nodes(&mut self) -> Result<(), ParseError> {
        self.lin.block("Nodes", |p| {
            let key = p.cur.expect(TokenKind::Ident)?;
            p.cur.expect(TokenKind::Colon)?;
            match key.text.as_str() {
                "Master" | "Commander" => {
                    let name = p.cur.ident()?;
                    p.cur.expect(TokenKind::Comma)?;
                    let time_base_ms = p.number_with_unit("ms")?;
                    p.cur.expect(TokenKind::Comma)?;
                    let jitter_ms = p.number_with_unit("ms")?;
                    // LIN 2.2A adds optional bit length and tolerance figures.
                    p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
                    p.cur.expect(TokenKind::Semicolon)?;
                    self.file.master = Some(MasterDef {
                        name,
                        time_base_ms,
                        jitter_ms,
                        pos: key.pos,
                    });
                }
                "Slaves" | "Responders" => {
                    let names = p.name_list()?;
                    self.file.slaves.extend(names);
                }
                _ => {
                    return Err(ParseError::new(
                        key.pos,
                        "'Master', 'Slaves', 'Commander' or 'Responders'",
                        key.describe(),
                    ));
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::diagnostics::Diagnostic;

    const SAMPLE: &str = r#"
/* Door cluster */
LIN_description_file;
LIN_protocol_version = "2.1";
LIN_language_version = "2.1";
LIN_speed = 19.2 kbps;
Channel_name = "DB";

Nodes {
  Master: CEM, 5 ms, 0.1 ms;
  Slaves: LSM, RSM;
}

Signals {
  InternalLightsRequest: 2, 0, CEM, LSM, RSM;
  LeftIntLightsSwitch: 8, 0, LSM, CEM;
  RSMerror: 1, 0, RSM, CEM;
  Serial: 16, {0x12, 0x34}, RSM, CEM;
}

Diagnostic_signals {
  MasterReqB0: 8, 0;
  SlaveRespB0: 8, 0;
}

Frames {
  CEM_Frm1: 0x01, CEM, 1 {
    InternalLightsRequest, 0;
  }
  LSM_Frm1: 0x02, LSM, 2 {
    LeftIntLightsSwitch, 0;
  }
  RSM_Frm1: 0x03, RSM, 3 {
    RSMerror, 0;
    Serial, 8;
  }
}

Sporadic_frames {
  SF1: LSM_Frm1, RSM_Frm1;
}

Event_triggered_frames {
  ETF1: Collision, 0x3A, LSM_Frm1, RSM_Frm1;
}

Diagnostic_frames {
  MasterReq: 0x3c {
    MasterReqB0, 0;
  }
  SlaveResp: 0x3d {
    SlaveRespB0, 0;
  }
}

Node_attributes {
  RSM {
    LIN_protocol = "2.1";
    configured_NAD = 0x20;
    initial_NAD = 0x20;
    product_id = 0x4e4e, 0x4553, 1;
    response_error = RSMerror;
    fault_state_signals = RSMerror;
    P2_min = 150 ms;
    ST_min = 50 ms;
    N_As_timeout = 1000 ms;
    N_Cr_timeout = 1000 ms;
    configurable_frames {
      CEM_Frm1;
      RSM_Frm1;
    }
  }
}

Schedule_tables {
  Configuration {
    AssignNAD {RSM} delay 15 ms;
    AssignFrameIdRange {RSM, 0} delay 15 ms;
    ConditionalChangeNAD {0x7F, 0x01, 0x03, 0x01, 0xFF, 0x01} delay 10 ms;
    DataDump {RSM, 0x10, 0x80, 0x00, 0xFF, 0xFF} delay 10 ms;
    SaveConfiguration {RSM} delay 10 ms;
    FreeFormat {0x3C, 0xB2, 0x00, 0x00, 0xFF, 0x7F, 0xFF, 0xFF} delay 10 ms;
    AssignFrameId {RSM, RSM_Frm1} delay 10 ms;
    MasterReq delay 10 ms;
    SlaveResp delay 10 ms;
  }
  Normal {
    CEM_Frm1 delay 15 ms;
    LSM_Frm1 delay 15 ms;
    RSM_Frm1 delay 20 ms;
  }
}

Signal_encoding_types {
  Dig2Bit {
    logical_value, 0, "off";
    logical_value, 1, "on";
    logical_value, 3, "error";
  }
  Brightness {
    physical_value, 0, 200, 0.5, 0, "%";
    physical_value, 201, 253, 1, 0;
    logical_value, 254, "init";
  }
}

Signal_representation {
  Dig2Bit: InternalLightsRequest;
  Brightness: LeftIntLightsSwitch;
}
"#;

    #[test]
    fn test_parse_sample() {
        let parsed = parse_str(SAMPLE).unwrap();
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let ldf = parsed.ast;

        assert_eq!(ldf.protocol_version, "2.1");
        assert_eq!(ldf.speed_kbps, 19.2);
        assert_eq!(ldf.channel_name.as_deref(), Some("DB"));
        let master = ldf.master.unwrap();
        assert_eq!((master.name.as_str(), master.time_base_ms, master.jitter_ms), ("CEM", 5.0, 0.1));
        assert_eq!(ldf.slaves, vec!["LSM", "RSM"]);

        assert_eq!(ldf.signals.len(), 4);
        assert_eq!(ldf.signals[0].subscribers, vec!["LSM", "RSM"]);
        assert_eq!(ldf.signals[3].init, InitValue::Array(vec![0x12, 0x34]));
        assert_eq!(ldf.diagnostic_signals[0].publisher, None);

        assert_eq!(ldf.frames.len(), 3);
        let rsm = &ldf.frames[2];
        assert_eq!((rsm.id, rsm.length), (3, 3));
        assert_eq!(rsm.publisher.as_deref(), Some("RSM"));
        assert_eq!(rsm.signals[1].name, "Serial");
        assert_eq!(rsm.signals[1].offset, 8);

        assert_eq!(ldf.sporadic_frames[0].frames, vec!["LSM_Frm1", "RSM_Frm1"]);
        let etf = &ldf.event_triggered_frames[0];
        assert_eq!(etf.collision_schedule.as_deref(), Some("Collision"));
        assert_eq!(etf.id, 0x3A);
        assert_eq!(ldf.diagnostic_frames[1].id, 0x3D);
        assert_eq!(ldf.diagnostic_frames[1].length, 8);

        let attrs = &ldf.node_attributes[0];
        assert_eq!(attrs.node, "RSM");
        assert_eq!(attrs.configured_nad, Some(0x20));
        assert_eq!(
            attrs.product_id,
            Some(ProductId {
                supplier_id: 0x4e4e,
                function_id: 0x4553,
                variant: Some(1)
            })
        );
        assert_eq!(attrs.p2_min_ms, Some(150.0));
        assert_eq!(attrs.configurable_frames.len(), 2);

        let config = &ldf.schedule_tables[0];
        assert_eq!(config.entries.len(), 9);
        assert_eq!(
            config.entries[2].command,
            ScheduleCommand::ConditionalChangeNad {
                nad: 0x7F,
                id: 0x01,
                byte: 0x03,
                mask: 0x01,
                inv: 0xFF,
                new_nad: 0x01
            }
        );
        assert_eq!(
            config.entries[6].command,
            ScheduleCommand::AssignFrameId {
                node: "RSM".into(),
                frame: "RSM_Frm1".into()
            }
        );
        assert_eq!(config.entries[7].command, ScheduleCommand::MasterReq);
        let normal = &ldf.schedule_tables[1];
        assert_eq!(normal.entries[2].command, ScheduleCommand::Frame("RSM_Frm1".into()));
        assert_eq!(normal.entries[2].delay_ms, 20.0);

        assert_eq!(ldf.encoding_types[1].values.len(), 3);
        assert_eq!(ldf.representations[1].signals, vec!["LeftIntLightsSwitch"]);
    }

    #[test]
    fn test_missing_header_is_fatal() {
        let err = parse_str("LIN_protocol_version = \"2.1\";").unwrap_err();
        assert_eq!(err.expected, "'LIN_description_file'");
        assert_eq!(err.position, Position::new(1, 1));
    }

    #[test]
    fn test_unclosed_block_is_fatal() {
        let err = parse_str("LIN_description_file;\nSignals {\n  A: 1, 0, M;\n").unwrap_err();
        assert_eq!(err.found, "end of file");
        assert!(err.expected.contains("Signals opened at 2:9"), "{}", err.expected);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let text = "LIN_description_file;
Signals {
  A: x, 0, M;
  B: 4, 0, M;
}
Frames {
  F1: 0x01, M, 1 { A 0; B, 4; }
  F2: 0x02, M, 1 { B, 0; }
}
Schedule_tables {
  T { AssignNAD {1} delay 5 ms; F2 delay 10 ms; }
}
";
        let parsed = parse_str(text).unwrap();
        let ldf = parsed.ast;
        assert_eq!(ldf.signals.len(), 1);
        assert_eq!(ldf.signals[0].name, "B");
        assert_eq!(ldf.frames.len(), 2);
        assert_eq!(ldf.frames[0].signals.len(), 1);
        assert_eq!(ldf.frames[0].signals[0].name, "B");
        assert_eq!(ldf.schedule_tables[0].entries.len(), 1);

        let errors: Vec<String> = parsed
            .diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Parse(e) => Some(e.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                "3:6: expected integer, found 'x'",
                "7:22: expected ',', found '0'",
                "11:18: expected identifier, found '1'",
            ]
        );
    }

    #[test]
    fn test_unknown_section_and_version_warnings() {
        let text = "LIN_description_file;
LIN_protocol_version = \"9.9\";
Node_composition { configuration C { Comp { A, B; } } }
LIN_sig_byte_order_big_endian;
Nodes { Commander: M, 10 ms, 0 ms; Responders: S; }
";
        let parsed = parse_str(text).unwrap();
        let warnings: Vec<String> = parsed.diagnostics.warnings().map(|w| w.to_string()).collect();
        assert_eq!(
            warnings,
            vec![
                "2:24: warning: unsupported LIN protocol version \"9.9\"",
                "3:1: warning: skipping unknown LDF section 'Node_composition'",
            ]
        );
        assert_eq!(parsed.ast.master.unwrap().name, "M");
        assert_eq!(parsed.ast.slaves, vec!["S"]);
    }
}
