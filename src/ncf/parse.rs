//! NCF parser, built on the LDF block grammar.

use log::debug;

use crate::core::cursor::Parsed;
use crate::core::lexer::{Token, TokenKind};
use crate::ldf::parse::LinParser;
use crate::ncf::ast::{
    Bitrate, DiagnosticDef, Direction, GeneralDef, NcfFile, NcfFrameDef, NcfSignalDef,
    NodeCapabilityDef,
};
use crate::types::errors::{LexError, ParseError};
use crate::types::signal::InitValue;

type Result<T> = std::result::Result<T, ParseError>;

/// Parses an NCF token stream.
pub fn parse<T>(tokens: T) -> Result<Parsed<NcfFile>>
where
    T: IntoIterator<Item = std::result::Result<Token, LexError>>,
{
    let mut p = LinParser::new(tokens, "NCF");
    p.header("node_capability_file")?;
    let mut file = NcfFile::default();
    while !p.cur.at_eof() {
        let start = p.cur.position();
        if let Err(e) = statement(&mut p, &mut file) {
            if let Some(fatal) = p.fatal.take() {
                return Err(fatal);
            }
            p.report(e);
            p.recover(start);
        }
    }
    debug!(
        "parsed NCF: {} nodes, {} diagnostics",
        file.nodes.len(),
        p.cur.diagnostics.len()
    );
    Ok(Parsed {
        ast: file,
        diagnostics: p.cur.diagnostics,
    })
}

/// Tokenizes and parses NCF text.
pub fn parse_str(text: &str) -> Result<Parsed<NcfFile>> {
    parse(crate::core::lexer::tokenize(text))
}

fn statement<I>(p: &mut LinParser<I>, file: &mut NcfFile) -> Result<()>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let token = p.cur.expect(TokenKind::Ident)?;
    match token.text.as_str() {
        "LIN_language_version" => {
            p.cur.expect(TokenKind::Equals)?;
            let pos = p.cur.position();
            let version = p.text_value()?;
            p.cur.expect(TokenKind::Semicolon)?;
            p.check_version("LIN language version", &version, pos);
            file.language_version = version;
        }
        "node" => {
            let node = node(p)?;
            file.nodes.push(node);
        }
        other => p.skip_unknown(other, token.pos)?,
    }
    Ok(())
}

fn node<I>(p: &mut LinParser<I>) -> Result<NodeCapabilityDef>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let token = p.cur.expect(TokenKind::Ident)?;
    let mut node = NodeCapabilityDef {
        name: token.text,
        pos: token.pos,
        ..Default::default()
    };
    p.block("node", |p| {
        let key = p.cur.expect(TokenKind::Ident)?;
        match key.text.as_str() {
            "general" => p.block("general", |p| general(p, &mut node.general)),
            "diagnostic" => p.block("diagnostic", |p| diagnostic(p, &mut node.diagnostic)),
            "frames" => p.block("frames", |p| {
                let frame = frame(p)?;
                node.frames.push(frame);
                Ok(())
            }),
            "encoding" => p.block("encoding", |p| {
                let encoding = p.encoding_type()?;
                node.encodings.push(encoding);
                Ok(())
            }),
            "status_management" => p.block("status_management", |p| {
                let key = p.cur.expect(TokenKind::Ident)?;
                p.cur.expect(TokenKind::Equals)?;
                match key.text.as_str() {
                    "response_error" => node.response_error = Some(p.cur.ident()?),
                    "fault_state_signals" => {
                        node.fault_state_signals = p.name_list()?;
                        return Ok(());
                    }
                    other => {
                        debug!("skipping status management entry '{}' at {}", other, key.pos);
                        p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
                    }
                }
                p.cur.expect(TokenKind::Semicolon)?;
                Ok(())
            }),
            "free_text" => p.braced(|p| {
                node.free_text = Some(p.cur.string()?);
                Ok(())
            }),
            other => p.skip_unknown(other, key.pos),
        }
    })?;
    Ok(node)
}

fn general<I>(p: &mut LinParser<I>, general: &mut GeneralDef) -> Result<()>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let key = p.cur.expect(TokenKind::Ident)?;
    p.cur.expect(TokenKind::Equals)?;
    match key.text.as_str() {
        "LIN_protocol_version" => {
            let pos = p.cur.position();
            let version = p.text_value()?;
            p.check_version("LIN protocol version", &version, pos);
            general.protocol_version = Some(version);
        }
        "supplier" => general.supplier = Some(p.u16()?),
        "function" => general.function = Some(p.u16()?),
        "variant" => general.variant = Some(p.byte()?),
        "bitrate" => general.bitrate = Some(bitrate(p)?),
        "sends_wake_up_signal" => {
            let value = p.text_value()?;
            general.sends_wake_up_signal = Some(value == "yes");
        }
        other => {
            debug!("skipping general entry '{}' at {}", other, key.pos);
            p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
        }
    }
    p.cur.expect(TokenKind::Semicolon)?;
    Ok(())
}

/// `automatic [min <r> kbps] [max <r> kbps]`, `select { <r> kbps, ... }` or `<r> kbps`.
fn bitrate<I>(p: &mut LinParser<I>) -> Result<Bitrate>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    if p.cur.eat_ident("automatic") {
        let (mut min, mut max) = (None, None);
        loop {
            if p.cur.eat_ident("min") {
                min = Some(p.number_with_unit("kbps")?);
            } else if p.cur.eat_ident("max") {
                max = Some(p.number_with_unit("kbps")?);
            } else {
                return Ok(Bitrate::Automatic { min, max });
            }
        }
    }
    if p.cur.eat_ident("select") {
        let rates = p.braced(|p| {
            let mut rates = vec![p.number_with_unit("kbps")?];
            while p.cur.eat(TokenKind::Comma).is_some() {
                rates.push(p.number_with_unit("kbps")?);
            }
            Ok(rates)
        })?;
        return Ok(Bitrate::Select(rates));
    }
    Ok(Bitrate::Fixed(p.number_with_unit("kbps")?))
}

fn diagnostic<I>(p: &mut LinParser<I>, diagnostic: &mut DiagnosticDef) -> Result<()>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let key = p.cur.expect(TokenKind::Ident)?;
    if key.text == "support_sid" {
        p.cur.eat(TokenKind::Equals);
        diagnostic.supported_sids = p.braced(|p| {
            let mut sids = vec![p.byte()?];
            while p.cur.eat(TokenKind::Comma).is_some() {
                sids.push(p.byte()?);
            }
            Ok(sids)
        })?;
        p.cur.eat(TokenKind::Semicolon);
        return Ok(());
    }
    p.cur.expect(TokenKind::Equals)?;
    match key.text.as_str() {
        "NAD" => {
            let first = p.byte()?;
            if p.cur.eat_ident("to") {
                let last = p.byte()?;
                diagnostic.nad = (first..=last).collect();
            } else {
                diagnostic.nad = vec![first];
                while p.cur.eat(TokenKind::Comma).is_some() {
                    diagnostic.nad.push(p.byte()?);
                }
            }
        }
        "diagnostic_class" => diagnostic.diagnostic_class = Some(p.byte()?),
        "P2_min" => diagnostic.p2_min_ms = Some(p.number_with_unit("ms")?),
        "ST_min" => diagnostic.st_min_ms = Some(p.number_with_unit("ms")?),
        other => {
            debug!("skipping diagnostic entry '{}' at {}", other, key.pos);
            p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
        }
    }
    p.cur.expect(TokenKind::Semicolon)?;
    Ok(())
}

fn frame<I>(p: &mut LinParser<I>) -> Result<NcfFrameDef>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let kind = p.cur.expect(TokenKind::Ident)?;
    let direction = match kind.text.as_str() {
        "publish" => Direction::Publish,
        "subscribe" => Direction::Subscribe,
        _ => {
            return Err(ParseError::new(
                kind.pos,
                "'publish' or 'subscribe'",
                kind.describe(),
            ));
        }
    };
    let token = p.cur.expect(TokenKind::Ident)?;
    let mut def = NcfFrameDef {
        direction,
        name: token.text,
        length: None,
        min_period_ms: None,
        max_period_ms: None,
        message_id: None,
        signals: Vec::new(),
        pos: token.pos,
    };
    p.block("frame", |p| {
        let key = p.cur.expect(TokenKind::Ident)?;
        if key.text == "signals" {
            return p.block("signals", |p| {
                if let Some(signal) = signal(p)? {
                    def.signals.push(signal);
                }
                Ok(())
            });
        }
        if p.cur.at(TokenKind::LBrace) {
            return p.skip_unknown(&key.text, key.pos);
        }
        p.cur.expect(TokenKind::Equals)?;
        match key.text.as_str() {
            "length" => def.length = Some(p.u16()?),
            "min_period" => def.min_period_ms = Some(p.number_with_unit("ms")?),
            "max_period" => def.max_period_ms = Some(p.number_with_unit("ms")?),
            "message_id" => def.message_id = Some(p.u32()?),
            other => {
                debug!("skipping frame entry '{}' at {}", other, key.pos);
                p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
            }
        }
        p.cur.expect(TokenKind::Semicolon)?;
        Ok(())
    })?;
    Ok(def)
}

/// A signal without `size` is reported and dropped.
fn signal<I>(p: &mut LinParser<I>) -> Result<Option<NcfSignalDef>>
where
    I: Iterator<Item = std::result::Result<Token, LexError>>,
{
    let token = p.cur.expect(TokenKind::Ident)?;
    let (mut size, mut init, mut offset, mut encoding) = (None, None, None, None);
    p.block("signal", |p| {
        let key = p.cur.expect(TokenKind::Ident)?;
        if p.cur.eat(TokenKind::Semicolon).is_some() {
            encoding = Some(key.text);
            return Ok(());
        }
        p.cur.expect(TokenKind::Equals)?;
        match key.text.as_str() {
            "size" => size = Some(p.u16()?),
            "init_value" => init = Some(p.init_value()?),
            "offset" => offset = Some(p.u16()?),
            other => {
                debug!("skipping signal entry '{}' at {}", other, key.pos);
                p.cur.skip_until(|c| c.at(TokenKind::Semicolon));
            }
        }
        p.cur.expect(TokenKind::Semicolon)?;
        Ok(())
    })?;
    let Some(size) = size else {
        p.report(ParseError::new(
            token.pos,
            format!("'size' in signal {}", token.text),
            "'}'",
        ));
        return Ok(None);
    };
    Ok(Some(NcfSignalDef {
        name: token.text,
        size,
        init: init.unwrap_or(InitValue::Scalar(0)),
        offset: offset.unwrap_or(0),
        encoding,
        pos: token.pos,
    }))
}
