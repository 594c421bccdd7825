//! Lowering of a [`DbcFile`] into the shared [`Network`].

use std::collections::{BTreeMap, HashMap};

use crate::core::lexer::Position;
use crate::dbc::ast::{
    AttributeKindDef, AttributeLiteral, DbcFile, MessageDef, MuxTag, ObjectRef, SignalDef,
};
use crate::normalize::{IntoNetwork, Resolver};
use crate::types::attributes::{AttrObject, AttrType, AttributeSpec, AttributeValue};
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::ReferenceKind;
use crate::types::message::{IdFormat, Message};
use crate::types::network::{BusType, MessageKey, Network, NodeKey, SignalKey};
use crate::types::signal::{ByteOrder, MuxInfo, MuxRole, MuxSelector, Signal, ValueType};

/// Placeholder node name meaning "no node".
pub const NO_NODE: &str = "Vector__XXX";

/// Bit 31 of a DBC identifier flags a 29-bit frame.
pub const EXTENDED_FLAG: u32 = 0x8000_0000;

/// Splits a raw DBC identifier into format and bare identifier.
pub fn split_raw_id(raw_id: u32) -> (IdFormat, u32) {
    let id = raw_id & !EXTENDED_FLAG;
    if raw_id & EXTENDED_FLAG != 0 || id > IdFormat::Standard.max_id() {
        (IdFormat::Extended, id)
    } else {
        (IdFormat::Standard, id)
    }
}

/// Inverse of [`split_raw_id`].
pub fn join_raw_id(id_format: IdFormat, id: u32) -> u32 {
    match id_format {
        IdFormat::Extended => id | EXTENDED_FLAG,
        IdFormat::Standard | IdFormat::Lin => id,
    }
}

impl IntoNetwork for DbcFile {
    fn to_network(&self, diagnostics: &mut Diagnostics) -> Network {
        let mut builder = Builder {
            file: self,
            network: Network::new("", BusType::Can),
            by_raw_id: HashMap::new(),
            unswitched: Vec::new(),
            diagnostics,
        };
        builder.build();
        builder.network
    }
}

struct Builder<'a> {
    file: &'a DbcFile,
    network: Network,
    /// Raw identifier as written in the file to message; first declaration wins.
    by_raw_id: HashMap<u32, MessageKey>,
    /// `mN` signals of messages without an `M` switch, with their context.
    unswitched: Vec<(SignalKey, String, Position)>,
    diagnostics: &'a mut Diagnostics,
}

impl Builder<'_> {
    fn build(&mut self) {
        let file = self.file;
        self.network.version = file.version.clone().unwrap_or_default();

        self.attribute_specs();
        for name in &file.nodes {
            self.network.add_node_if_absent(name);
        }
        for table in &file.value_tables {
            self.network
                .value_tables
                .insert(table.name.clone(), table.entries.iter().cloned().collect());
        }
        for message in &file.messages {
            self.message(message);
        }
        self.extended_multiplexing();
        self.unswitched_signals();
        self.tx_nodes();
        self.comments();
        self.attribute_values();
        self.value_descriptions();
        self.signal_value_types();

        if self.network.iter_messages().any(|m| m.byte_length > 8) {
            self.network.bus_type = BusType::CanFd;
        }
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(&self.network, self.diagnostics)
    }

    /// Message by raw identifier, reporting a miss.
    fn message_key(&mut self, raw_id: u32, context: &str, pos: Position) -> Option<MessageKey> {
        let key = self.by_raw_id.get(&raw_id).copied();
        if key.is_none() {
            self.resolver()
                .report(ReferenceKind::Message, &raw_id.to_string(), context, Some(pos));
        }
        key
    }

    fn signal_key(&mut self, raw_id: u32, name: &str, context: &str, pos: Position) -> Option<SignalKey> {
        let mk = self.message_key(raw_id, context, pos)?;
        self.resolver().signal(mk, name, context, Some(pos))
    }

    fn node_key(&mut self, name: &str, context: &str, pos: Position) -> Option<NodeKey> {
        if name == NO_NODE {
            return None;
        }
        self.resolver().node(name, context, Some(pos))
    }

    // --- attribute definitions and defaults ---

    fn attribute_specs(&mut self) {
        let file = self.file;
        for def in &file.attribute_defs {
            let Some(object) = def.object else {
                log::debug!("ignoring environment variable attribute '{}'", def.name);
                continue;
            };
            let mut spec = AttributeSpec {
                name: def.name.clone(),
                type_of_object: object,
                ..Default::default()
            };
            match &def.kind {
                AttributeKindDef::Int { min, max } => {
                    spec.kind = AttrType::Int;
                    spec.int_min = Some(*min);
                    spec.int_max = Some(*max);
                }
                AttributeKindDef::Hex { min, max } => {
                    spec.kind = AttrType::Hex;
                    spec.hex_min = Some(*min);
                    spec.hex_max = Some(*max);
                }
                AttributeKindDef::Float { min, max } => {
                    spec.kind = AttrType::Float;
                    spec.float_min = Some(*min);
                    spec.float_max = Some(*max);
                }
                AttributeKindDef::String => spec.kind = AttrType::String,
                AttributeKindDef::Enum(values) => {
                    spec.kind = AttrType::Enum;
                    spec.enum_values = values.clone();
                }
            }
            self.spec_map(object).insert(def.name.clone(), spec);
        }

        for default in &file.attribute_defaults {
            let object = [
                AttrObject::Network,
                AttrObject::Node,
                AttrObject::Message,
                AttrObject::Signal,
            ]
            .into_iter()
            .find(|&object| self.spec_map(object).contains_key(&default.name));
            let spec = match object {
                Some(object) => self.spec_map(object).get_mut(&default.name),
                None => None,
            };
            match spec {
                Some(spec) => {
                    let value = literal_value(&default.value, Some(&*spec));
                    spec.default = Some(value);
                }
                None => self.diagnostics.warn(
                    Some(default.pos),
                    format!("default for undefined attribute '{}'", default.name),
                ),
            }
        }
    }

    fn spec_map(&mut self, object: AttrObject) -> &mut BTreeMap<String, AttributeSpec> {
        match object {
            AttrObject::Network => &mut self.network.network_attr_spec,
            AttrObject::Node => &mut self.network.node_attr_spec,
            AttrObject::Message => &mut self.network.msg_attr_spec,
            AttrObject::Signal => &mut self.network.sig_attr_spec,
        }
    }

    // --- messages and signals ---

    fn message(&mut self, def: &MessageDef) {
        let (id_format, id) = split_raw_id(def.raw_id);
        let context = format!("message '{}'", def.name);

        let mut message = Message::new(def.name.clone(), id, id_format, def.dlc);
        if let Some(sender) = self.node_key(&def.transmitter, &context, def.pos) {
            message.senders.push(sender);
        }
        let mk = self.network.add_message(message);
        self.by_raw_id.entry(def.raw_id).or_insert(mk);

        let mut gated = Vec::new();
        for sig in &def.signals {
            let signal = self.signal(sig, &def.name);
            let is_gated = signal.mux.role.is_gated();
            if let Some(sk) = self.network.add_signal(mk, signal)
                && is_gated
            {
                let context = format!("signal '{}' of message '{}'", sig.name, def.name);
                gated.push((sk, context, sig.pos));
            }
        }

        // Plain multiplexing: gated signals follow the message's only top-level switch.
        let switches = self.network.multiplexors(mk);
        if switches.is_empty() {
            self.unswitched.extend(gated);
        }
        if let [switch] = switches.as_slice() {
            let gated: Vec<SignalKey> = self
                .network
                .message_signals(mk)
                .into_iter()
                .filter(|(_, s)| s.mux.role.is_gated())
                .map(|(k, _)| k)
                .collect();
            for sk in gated {
                if let Some(s) = self.network.get_sig_by_key_mut(sk) {
                    s.mux.switch = Some(*switch);
                }
            }
        }
    }

    fn signal(&mut self, def: &SignalDef, message: &str) -> Signal {
        let context = format!("signal '{}' of message '{}'", def.name, message);
        let receivers: Vec<NodeKey> = def
            .receivers
            .iter()
            .filter_map(|name| self.node_key(name, &context, def.pos))
            .collect();

        let mux = match def.mux {
            MuxTag::None => MuxInfo::default(),
            MuxTag::Multiplexor => MuxInfo {
                role: MuxRole::Multiplexor,
                ..Default::default()
            },
            MuxTag::Multiplexed(v) => MuxInfo {
                role: MuxRole::Multiplexed,
                switch: None,
                selectors: vec![MuxSelector::Value(v)],
            },
            MuxTag::MultiplexedMultiplexor(v) => MuxInfo {
                role: MuxRole::MultiplexedMultiplexor,
                switch: None,
                selectors: vec![MuxSelector::Value(v)],
            },
        };

        Signal {
            name: def.name.clone(),
            start_bit: def.start_bit,
            width: def.width,
            byte_order: Some(def.byte_order.unwrap_or(ByteOrder::BigEndian)),
            value_type: if def.signed {
                ValueType::Signed
            } else {
                ValueType::Unsigned
            },
            scale: def.scale,
            offset: def.offset,
            min: def.min,
            max: def.max,
            unit: def.unit.clone(),
            receivers,
            mux,
            ..Default::default()
        }
    }

    /// `SG_MUL_VAL_`: explicit switch and selector ranges.
    fn extended_multiplexing(&mut self) {
        let file = self.file;
        for entry in &file.extended_mux {
            let context = format!("SG_MUL_VAL_ {} {}", entry.raw_id, entry.signal);
            let Some(mk) = self.message_key(entry.raw_id, &context, entry.pos) else {
                continue;
            };
            let Some(sk) = self
                .resolver()
                .signal(mk, &entry.signal, &context, Some(entry.pos))
            else {
                continue;
            };
            let switch = self.network.get_sig_key_by_name(mk, &entry.switch);
            if switch.is_none() {
                self.resolver().report(
                    ReferenceKind::Multiplexor,
                    &entry.switch,
                    &context,
                    Some(entry.pos),
                );
            }
            let selectors: Vec<MuxSelector> = entry
                .ranges
                .iter()
                .map(|&(min, max)| {
                    if min == max {
                        MuxSelector::Value(min)
                    } else {
                        MuxSelector::Range { min, max }
                    }
                })
                .collect();
            if let Some(signal) = self.network.get_sig_by_key_mut(sk) {
                if !signal.mux.role.is_gated() {
                    signal.mux.role = MuxRole::Multiplexed;
                }
                signal.mux.switch = switch;
                signal.mux.selectors = selectors;
            }
        }
    }

    /// Reports `mN` signals that neither an `M` switch nor `SG_MUL_VAL_` resolved.
    fn unswitched_signals(&mut self) {
        let unswitched = std::mem::take(&mut self.unswitched);
        for (sk, context, pos) in unswitched {
            let orphaned = self
                .network
                .get_sig_by_key(sk)
                .is_some_and(|s| s.mux.switch.is_none());
            if orphaned {
                self.resolver()
                    .report(ReferenceKind::Multiplexor, "M", &context, Some(pos));
            }
        }
    }

    fn tx_nodes(&mut self) {
        let file = self.file;
        for entry in &file.tx_nodes {
            let context = format!("BO_TX_BU_ {}", entry.raw_id);
            let Some(mk) = self.message_key(entry.raw_id, &context, entry.pos) else {
                continue;
            };
            for name in &entry.nodes {
                if let Some(nk) = self.node_key(name, &context, entry.pos) {
                    self.network.add_tx_msg_for_node(nk, mk);
                }
            }
        }
    }

    fn comments(&mut self) {
        let file = self.file;
        for comment in &file.comments {
            let text = comment.text.clone();
            match &comment.target {
                ObjectRef::Network => self.network.comment = text,
                ObjectRef::Node(name) => {
                    if let Some(nk) = self.node_key(name, "CM_ BU_", comment.pos)
                        && let Some(node) = self.network.get_node_by_key_mut(nk)
                    {
                        node.comment = text;
                    }
                }
                ObjectRef::Message(raw_id) => {
                    if let Some(mk) = self.message_key(*raw_id, "CM_ BO_", comment.pos)
                        && let Some(m) = self.network.get_message_by_key_mut(mk)
                    {
                        m.comment = text;
                    }
                }
                ObjectRef::Signal(raw_id, name) => {
                    if let Some(sk) = self.signal_key(*raw_id, name, "CM_ SG_", comment.pos)
                        && let Some(s) = self.network.get_sig_by_key_mut(sk)
                    {
                        s.comment = text;
                    }
                }
                ObjectRef::EnvVar(_) => {}
            }
        }
    }

    fn attribute_values(&mut self) {
        let file = self.file;
        for assignment in &file.attribute_values {
            let name = assignment.name.clone();
            let pos = assignment.pos;
            match &assignment.target {
                ObjectRef::Network => {
                    let value =
                        literal_value(&assignment.value, self.network.network_attr_spec.get(&name));
                    match (name.as_str(), value.as_str()) {
                        ("BusType", Some(bus)) if bus.eq_ignore_ascii_case("CAN FD") => {
                            self.network.bus_type = BusType::CanFd;
                        }
                        ("DBName", Some(db_name)) => self.network.name = db_name.to_string(),
                        _ => {}
                    }
                    self.network.attributes.insert(name, value);
                }
                ObjectRef::Node(node) => {
                    let value =
                        literal_value(&assignment.value, self.network.node_attr_spec.get(&name));
                    if let Some(nk) = self.node_key(node, "BA_ BU_", pos)
                        && let Some(n) = self.network.get_node_by_key_mut(nk)
                    {
                        n.attributes.insert(name, value);
                    }
                }
                ObjectRef::Message(raw_id) => {
                    let value =
                        literal_value(&assignment.value, self.network.msg_attr_spec.get(&name));
                    if let Some(mk) = self.message_key(*raw_id, "BA_ BO_", pos)
                        && let Some(m) = self.network.get_message_by_key_mut(mk)
                    {
                        if name == "GenMsgCycleTime" {
                            m.cycle_time_ms = value.as_f64();
                        }
                        m.attributes.insert(name, value);
                    }
                }
                ObjectRef::Signal(raw_id, signal) => {
                    let value =
                        literal_value(&assignment.value, self.network.sig_attr_spec.get(&name));
                    if let Some(sk) = self.signal_key(*raw_id, signal, "BA_ SG_", pos)
                        && let Some(s) = self.network.get_sig_by_key_mut(sk)
                    {
                        s.attributes.insert(name, value);
                    }
                }
                ObjectRef::EnvVar(_) => {}
            }
        }
    }

    fn value_descriptions(&mut self) {
        let file = self.file;
        for desc in &file.value_descriptions {
            let ObjectRef::Signal(raw_id, name) = &desc.target else {
                continue;
            };
            if let Some(sk) = self.signal_key(*raw_id, name, "VAL_", desc.pos)
                && let Some(s) = self.network.get_sig_by_key_mut(sk)
            {
                s.value_descriptions = desc.entries.iter().cloned().collect();
            }
        }
    }

    fn signal_value_types(&mut self) {
        let file = self.file;
        for entry in &file.signal_value_types {
            let value_type = match entry.code {
                1 => ValueType::Float32,
                2 => ValueType::Float64,
                _ => continue,
            };
            if let Some(sk) = self.signal_key(entry.raw_id, &entry.signal, "SIG_VALTYPE_", entry.pos)
                && let Some(s) = self.network.get_sig_by_key_mut(sk)
            {
                s.value_type = value_type;
            }
        }
    }
}

fn literal_value(literal: &AttributeLiteral, spec: Option<&AttributeSpec>) -> AttributeValue {
    match (literal, spec) {
        (AttributeLiteral::Number(v), Some(spec)) => spec.value_from_number(*v),
        (AttributeLiteral::Str(s), Some(spec)) => spec.value_from_string(s),
        (AttributeLiteral::Number(v), None) if v.fract() == 0.0 => AttributeValue::Int(*v as i64),
        (AttributeLiteral::Number(v), None) => AttributeValue::Float(*v),
        (AttributeLiteral::Str(s), None) => AttributeValue::Str(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::parse::parse_str;
    use crate::normalize::normalize;

    fn network(text: &str) -> (Network, Diagnostics) {
        let parsed = parse_str(text).unwrap();
        let mut diagnostics = parsed.diagnostics;
        let network = normalize(&parsed.ast, &mut diagnostics);
        (network, diagnostics)
    }

    const SAMPLE: &str = r#"VERSION "2.1"
BU_: ECU ABS
BO_ 256 EngineData: 8 ECU
 SG_ Speed : 0|16@1+ (0.1,0) [0|6553.5] "km/h" ABS
 SG_ Temp : 23|8@0- (1,-40) [-40|215] "degC" Vector__XXX
 SG_ Raw : 39|32 (1,0) [0|0] "" ABS
BO_ 2147484672 Mux: 8 ABS
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU
 SG_ A m0 : 8|8@1+ (1,0) [0|255] "" ECU
 SG_ B m1 : 8|8@1+ (1,0) [0|255] "" ECU
BO_TX_BU_ 256 : ECU,ABS;
CM_ BU_ ECU "Engine controller";
CM_ SG_ 256 Speed "Vehicle speed";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_DEF_ BO_ "GenMsgSendType" ENUM "Cyclic","OnEvent";
BA_DEF_ "DBName" STRING;
BA_DEF_DEF_ "GenMsgCycleTime" 100;
BA_ "DBName" "Powertrain";
BA_ "GenMsgCycleTime" BO_ 256 20;
BA_ "GenMsgSendType" BO_ 256 1;
VAL_ 256 Temp -40 "Cold" 215 "Hot" ;
SIG_VALTYPE_ 256 Raw : 1;
SG_MUL_VAL_ 2147484672 B Mode 1-1, 4-6;
"#;

    #[test]
    fn test_normalize_sample() {
        let (net, diagnostics) = network(SAMPLE);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        assert_eq!(net.name, "Powertrain");
        assert_eq!(net.version, "2.1");
        assert_eq!(net.bus_type, BusType::Can);

        let engine = net.get_message_by_name("EngineData").unwrap();
        assert_eq!(engine.id_format, IdFormat::Standard);
        assert_eq!(engine.cycle_time_ms, Some(20.0));
        assert_eq!(
            engine.attributes.get("GenMsgSendType"),
            Some(&AttributeValue::Enum("OnEvent".into()))
        );
        let ecu = net.get_node_key_by_name("ECU").unwrap();
        let abs = net.get_node_key_by_name("ABS").unwrap();
        assert_eq!(engine.senders, vec![ecu, abs]);

        let speed = net.get_signal_by_name("EngineData", "Speed").unwrap();
        assert_eq!(speed.byte_order, Some(ByteOrder::LittleEndian));
        assert_eq!(speed.comment, "Vehicle speed");
        assert_eq!(speed.receivers, vec![abs]);
        let temp = net.get_signal_by_name("EngineData", "Temp").unwrap();
        assert_eq!(temp.value_type, ValueType::Signed);
        assert!(temp.receivers.is_empty());
        assert_eq!(temp.value_descriptions.get(&215).map(String::as_str), Some("Hot"));
        let raw = net.get_signal_by_name("EngineData", "Raw").unwrap();
        assert_eq!(raw.byte_order, Some(ByteOrder::BigEndian));
        assert_eq!(raw.value_type, ValueType::Float32);

        assert_eq!(net.get_node_by_name("ECU").unwrap().comment, "Engine controller");
        assert_eq!(
            net.msg_attr_spec["GenMsgCycleTime"].default,
            Some(AttributeValue::Int(100))
        );

        let mux = net.get_message_by_name("Mux").unwrap();
        assert_eq!((mux.id_format, mux.id), (IdFormat::Extended, 0x400));
        let mk = net.get_msg_key_by_name("Mux").unwrap();
        let mode = net.get_sig_key_by_name(mk, "Mode").unwrap();
        let a = net.get_signal_by_name("Mux", "A").unwrap();
        assert_eq!(a.mux.switch, Some(mode));
        assert_eq!(a.mux.selectors, vec![MuxSelector::Value(0)]);
        let b = net.get_signal_by_name("Mux", "B").unwrap();
        assert_eq!(
            b.mux.selectors,
            vec![MuxSelector::Value(1), MuxSelector::Range { min: 4, max: 6 }]
        );
        // ECU receives signals of the ABS-sent multiplexed message.
        assert!(net.get_node_by_name("ECU").unwrap().messages_received.contains(&mk));
    }

    #[test]
    fn test_unresolved_references_are_reported_and_skipped() {
        let text = "BU_: ECU\nBO_ 1 M: 8 Ghost\n SG_ S : 0|8@1+ (1,0) [0|255] \"\" ECU,Phantom\nCM_ BO_ 99 \"lost\";\nSG_MUL_VAL_ 1 S NoSwitch 0-0;\n";
        let (net, diagnostics) = network(text);
        let errors: Vec<(ReferenceKind, String)> = diagnostics
            .reference_errors()
            .map(|e| (e.kind, e.name.clone()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (ReferenceKind::Node, "Ghost".to_string()),
                (ReferenceKind::Node, "Phantom".to_string()),
                (ReferenceKind::Multiplexor, "NoSwitch".to_string()),
                (ReferenceKind::Message, "99".to_string()),
            ]
        );
        let m = net.get_message_by_name("M").unwrap();
        assert!(m.senders.is_empty());
        assert_eq!(m.signals.len(), 1);
    }

    #[test]
    fn test_gated_signals_without_switch_are_reported() {
        let text = "BO_ 2 NoSwitch: 8 Vector__XXX
 SG_ A m0 : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX
 SG_ B m1 : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX
 SG_ C : 8|8@1+ (1,0) [0|255] \"\" Vector__XXX
BO_ 3 Extended: 8 Vector__XXX
 SG_ Sel : 0|4@1+ (1,0) [0|15] \"\" Vector__XXX
 SG_ D m2 : 8|8@1+ (1,0) [0|255] \"\" Vector__XXX
SG_MUL_VAL_ 3 D Sel 2-2;
";
        let (net, diagnostics) = network(text);
        let errors: Vec<String> = diagnostics.reference_errors().map(|e| e.to_string()).collect();
        assert_eq!(
            errors,
            vec![
                "unresolved multiplexor 'M' referenced by signal 'A' of message 'NoSwitch'",
                "unresolved multiplexor 'M' referenced by signal 'B' of message 'NoSwitch'",
            ]
        );
        let d = net.get_signal_by_name("Extended", "D").unwrap();
        assert_eq!(d.mux.switch, net.find_signal_key("Sel"));
    }

    #[test]
    fn test_large_dlc_selects_can_fd() {
        let (net, _) = network("BO_ 1 Big: 64 Vector__XXX\n");
        assert_eq!(net.bus_type, BusType::CanFd);
        let (net, _) = network("BA_ \"BusType\" \"CAN FD\";\nBO_ 1 Small: 8 Vector__XXX\n");
        assert_eq!(net.bus_type, BusType::CanFd);
    }

    #[test]
    fn test_raw_id_split() {
        assert_eq!(split_raw_id(0x8000_0123), (IdFormat::Extended, 0x123));
        assert_eq!(split_raw_id(0x123), (IdFormat::Standard, 0x123));
        assert_eq!(split_raw_id(0x1234), (IdFormat::Extended, 0x1234));
        assert_eq!(join_raw_id(IdFormat::Extended, 0x123), 0x8000_0123);
    }
}
