//! Renders a [`Network`] as DBC text.
//!
//! Output order follows what Vector tools write: header, nodes, value tables,
//! messages, extra transmitters, attribute definitions/defaults/assignments,
//! comments, value descriptions, float types and extended multiplexing.
//! Parsing the result again yields an equivalent network.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use crate::core::strings::{escape_dbc_string, format_f64};
use crate::dbc::normalize::{NO_NODE, join_raw_id};
use crate::types::attributes::{AttrType, AttributeSpec, AttributeValue};
use crate::types::message::Message;
use crate::types::network::{Network, NodeKey};
use crate::types::signal::{ByteOrder, MuxRole, MuxSelector, Signal, ValueType};

const NS_KEYWORDS: &[&str] = &[
    "NS_DESC_",
    "CM_",
    "BA_DEF_",
    "BA_",
    "VAL_",
    "CAT_DEF_",
    "CAT_",
    "FILTER",
    "BA_DEF_DEF_",
    "EV_DATA_",
    "ENVVAR_DATA_",
    "SGTYPE_",
    "SGTYPE_VAL_",
    "BA_DEF_SGTYPE_",
    "BA_SGTYPE_",
    "SIG_TYPE_REF_",
    "VAL_TABLE_",
    "SIG_GROUP_",
    "SIG_VALTYPE_",
    "SIGTYPE_VALTYPE_",
    "BO_TX_BU_",
    "BA_DEF_REL_",
    "BA_REL_",
    "BA_DEF_DEF_REL_",
    "BU_SG_REL_",
    "BU_EV_REL_",
    "BU_BO_REL_",
    "SG_MUL_VAL_",
];

/// Serializes `network` into DBC text.
pub fn to_dbc_string(network: &Network) -> Result<String, fmt::Error> {
    let mut out = String::new();

    writeln!(out, "VERSION \"{}\"", escape_dbc_string(&network.version))?;
    out.push('\n');

    out.push_str("NS_ :\n");
    for keyword in NS_KEYWORDS {
        writeln!(out, "\t{}", keyword)?;
    }
    out.push('\n');

    out.push_str("BS_:\n\n");

    out.push_str("BU_:");
    for node in network.iter_nodes() {
        write!(out, " {}", node.name)?;
    }
    out.push_str("\n\n");

    for (name, entries) in &network.value_tables {
        write!(out, "VAL_TABLE_ {}", name)?;
        write_value_entries(&mut out, entries)?;
    }
    if !network.value_tables.is_empty() {
        out.push('\n');
    }

    write_messages(network, &mut out)?;
    write_bo_tx_bu(network, &mut out)?;
    out.push('\n');

    write_attribute_definitions(network, &mut out)?;
    write_attribute_defaults(network, &mut out)?;
    write_attribute_assignments(network, &mut out)?;
    out.push('\n');

    write_comments(network, &mut out)?;
    write_value_descriptions(network, &mut out)?;
    write_sig_valtype(network, &mut out)?;
    write_extended_mux(network, &mut out)?;

    Ok(out)
}

fn raw_id(message: &Message) -> u32 {
    join_raw_id(message.id_format, message.id)
}

fn node_names(network: &Network, keys: &[NodeKey]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in keys.iter().filter_map(|&nk| network.node_name(nk)) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn write_messages(network: &Network, out: &mut String) -> fmt::Result {
    for (mk, message) in network.iter_message_entries() {
        let transmitter = message
            .senders
            .iter()
            .find_map(|&nk| network.node_name(nk))
            .unwrap_or(NO_NODE);
        writeln!(
            out,
            "BO_ {} {}: {} {}",
            raw_id(message),
            message.name,
            message.byte_length,
            transmitter
        )?;

        for (_, signal) in network.message_signals(mk) {
            let order = match signal.byte_order {
                Some(ByteOrder::LittleEndian) => '1',
                Some(ByteOrder::BigEndian) | None => '0',
            };
            let sign = match signal.value_type {
                ValueType::Unsigned => '+',
                ValueType::Signed | ValueType::Float32 | ValueType::Float64 => '-',
            };
            let receivers = node_names(network, &signal.receivers);
            let receivers = if receivers.is_empty() {
                NO_NODE.to_string()
            } else {
                receivers.join(",")
            };
            writeln!(
                out,
                " SG_ {}{} : {}|{}@{}{} ({},{}) [{}|{}] \"{}\" {}",
                signal.name,
                mux_tag(signal),
                signal.start_bit,
                signal.width,
                order,
                sign,
                format_f64(signal.scale),
                format_f64(signal.offset),
                format_f64(signal.min),
                format_f64(signal.max),
                escape_dbc_string(&signal.unit),
                receivers
            )?;
        }
        out.push('\n');
    }
    Ok(())
}

fn mux_tag(signal: &Signal) -> String {
    let selector = signal.mux.selectors.first().map(|s| s.bounds().0);
    match (signal.mux.role, selector) {
        (MuxRole::None, _) => String::new(),
        (MuxRole::Multiplexor, _) => " M".to_string(),
        (MuxRole::Multiplexed, Some(v)) => format!(" m{}", v),
        (MuxRole::MultiplexedMultiplexor, Some(v)) => format!(" m{}M", v),
        // A gated signal without selectors cannot be expressed; keep it plain.
        (MuxRole::Multiplexed, None) => String::new(),
        (MuxRole::MultiplexedMultiplexor, None) => " M".to_string(),
    }
}

/// Whether the `mN` tag alone describes the signal's gating.
fn needs_extended_mux(network: &Network, signal: &Signal) -> bool {
    if !signal.mux.role.is_gated() || signal.mux.selectors.is_empty() {
        return false;
    }
    let single_value = matches!(signal.mux.selectors.as_slice(), [MuxSelector::Value(_)]);
    let implicit = match network.multiplexors(signal.message).as_slice() {
        [switch] => signal.mux.switch == Some(*switch),
        _ => false,
    };
    !(single_value && implicit)
}

fn write_bo_tx_bu(network: &Network, out: &mut String) -> fmt::Result {
    for message in network.iter_messages() {
        let transmitters = node_names(network, &message.senders);
        if transmitters.len() < 2 {
            continue;
        }
        writeln!(
            out,
            "BO_TX_BU_ {} : {};",
            raw_id(message),
            transmitters.join(",")
        )?;
    }
    Ok(())
}

fn write_attribute_definitions(network: &Network, out: &mut String) -> fmt::Result {
    let scopes = [
        &network.network_attr_spec,
        &network.node_attr_spec,
        &network.msg_attr_spec,
        &network.sig_attr_spec,
    ];
    for specs in scopes {
        for (name, spec) in specs {
            match spec.type_of_object.dbc_keyword() {
                Some(keyword) => write!(out, "BA_DEF_ {} ", keyword)?,
                None => out.push_str("BA_DEF_ "),
            }
            writeln!(out, "\"{}\" {};", name, format_attribute_def(spec))?;
        }
    }
    Ok(())
}

fn write_attribute_defaults(network: &Network, out: &mut String) -> fmt::Result {
    let mut defaults: BTreeMap<&str, (&AttributeValue, &AttributeSpec)> = BTreeMap::new();
    for specs in [
        &network.network_attr_spec,
        &network.node_attr_spec,
        &network.msg_attr_spec,
        &network.sig_attr_spec,
    ] {
        for (name, spec) in specs {
            if let Some(default) = spec.default.as_ref() {
                defaults.entry(name.as_str()).or_insert((default, spec));
            }
        }
    }
    for (name, (value, spec)) in defaults {
        writeln!(
            out,
            "BA_DEF_DEF_ \"{}\" {};",
            name,
            format_attribute_value(value, Some(spec))
        )?;
    }
    Ok(())
}

fn write_attribute_assignments(network: &Network, out: &mut String) -> fmt::Result {
    for (name, value) in &network.attributes {
        let spec = network.network_attr_spec.get(name);
        writeln!(out, "BA_ \"{}\" {};", name, format_attribute_value(value, spec))?;
    }

    for node in network.iter_nodes() {
        for (name, value) in &node.attributes {
            let spec = network.node_attr_spec.get(name);
            writeln!(
                out,
                "BA_ \"{}\" BU_ {} {};",
                name,
                node.name,
                format_attribute_value(value, spec)
            )?;
        }
    }

    for message in network.iter_messages() {
        for (name, value) in &message.attributes {
            let spec = network.msg_attr_spec.get(name);
            writeln!(
                out,
                "BA_ \"{}\" BO_ {} {};",
                name,
                raw_id(message),
                format_attribute_value(value, spec)
            )?;
        }
    }

    for (mk, message) in network.iter_message_entries() {
        for (_, signal) in network.message_signals(mk) {
            for (name, value) in &signal.attributes {
                let spec = network.sig_attr_spec.get(name);
                writeln!(
                    out,
                    "BA_ \"{}\" SG_ {} {} {};",
                    name,
                    raw_id(message),
                    signal.name,
                    format_attribute_value(value, spec)
                )?;
            }
        }
    }
    Ok(())
}

fn write_comments(network: &Network, out: &mut String) -> fmt::Result {
    if !network.comment.is_empty() {
        writeln!(out, "CM_ \"{}\";", escape_dbc_string(&network.comment))?;
    }

    for node in network.iter_nodes() {
        if node.comment.is_empty() {
            continue;
        }
        writeln!(
            out,
            "CM_ BU_ {} \"{}\";",
            node.name,
            escape_dbc_string(&node.comment)
        )?;
    }

    for (mk, message) in network.iter_message_entries() {
        if !message.comment.is_empty() {
            writeln!(
                out,
                "CM_ BO_ {} \"{}\";",
                raw_id(message),
                escape_dbc_string(&message.comment)
            )?;
        }
        for (_, signal) in network.message_signals(mk) {
            if signal.comment.is_empty() {
                continue;
            }
            writeln!(
                out,
                "CM_ SG_ {} {} \"{}\";",
                raw_id(message),
                signal.name,
                escape_dbc_string(&signal.comment)
            )?;
        }
    }
    Ok(())
}

fn write_value_descriptions(network: &Network, out: &mut String) -> fmt::Result {
    for (mk, message) in network.iter_message_entries() {
        for (_, signal) in network.message_signals(mk) {
            if signal.value_descriptions.is_empty() {
                continue;
            }
            write!(out, "VAL_ {} {}", raw_id(message), signal.name)?;
            write_value_entries(out, &signal.value_descriptions)?;
        }
    }
    Ok(())
}

fn write_value_entries(out: &mut String, entries: &BTreeMap<i64, String>) -> fmt::Result {
    for (value, description) in entries {
        write!(out, " {} \"{}\"", value, escape_dbc_string(description))?;
    }
    out.push_str(" ;\n");
    Ok(())
}

fn write_sig_valtype(network: &Network, out: &mut String) -> fmt::Result {
    for (mk, message) in network.iter_message_entries() {
        for (_, signal) in network.message_signals(mk) {
            let code = match signal.value_type {
                ValueType::Float32 => 1,
                ValueType::Float64 => 2,
                ValueType::Unsigned | ValueType::Signed => continue,
            };
            writeln!(
                out,
                "SIG_VALTYPE_ {} {} : {};",
                raw_id(message),
                signal.name,
                code
            )?;
        }
    }
    Ok(())
}

fn write_extended_mux(network: &Network, out: &mut String) -> fmt::Result {
    for (mk, message) in network.iter_message_entries() {
        for (_, signal) in network.message_signals(mk) {
            if !needs_extended_mux(network, signal) {
                continue;
            }
            let Some(switch) = signal.mux.switch.and_then(|k| network.get_sig_by_key(k)) else {
                continue;
            };
            let ranges: Vec<String> = signal
                .mux
                .selectors
                .iter()
                .map(|s| {
                    let (min, max) = s.bounds();
                    format!("{}-{}", min, max)
                })
                .collect();
            writeln!(
                out,
                "SG_MUL_VAL_ {} {} {} {};",
                raw_id(message),
                signal.name,
                switch.name,
                ranges.join(", ")
            )?;
        }
    }
    Ok(())
}

fn format_attribute_def(spec: &AttributeSpec) -> String {
    match spec.kind {
        AttrType::String => "STRING".to_string(),
        AttrType::Int | AttrType::Hex | AttrType::Float => format!(
            "{} {} {}",
            spec.kind,
            spec.minimum_to_string(),
            spec.maximum_to_string()
        ),
        AttrType::Enum => {
            let joined = spec
                .enum_values
                .iter()
                .map(|value| format!("\"{}\"", escape_dbc_string(value)))
                .collect::<Vec<_>>()
                .join(",");
            format!("ENUM {}", joined)
        }
    }
}

fn format_attribute_value(value: &AttributeValue, spec: Option<&AttributeSpec>) -> String {
    match value {
        AttributeValue::Str(s) => format!("\"{}\"", escape_dbc_string(s)),
        AttributeValue::Int(v) => v.to_string(),
        AttributeValue::Hex(v) => v.to_string(),
        AttributeValue::Float(v) => format_f64(*v),
        AttributeValue::Enum(selected) => {
            if let Some(spec) = spec.filter(|s| s.kind == AttrType::Enum)
                && let Some(idx) = spec.enum_values.iter().position(|entry| entry == selected)
            {
                return idx.to_string();
            }
            format!("\"{}\"", escape_dbc_string(selected))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::parse::parse_str;
    use crate::normalize::normalize;
    use crate::types::diagnostics::Diagnostics;

    fn network(text: &str) -> Network {
        let parsed = parse_str(text).unwrap();
        let mut diagnostics: Diagnostics = parsed.diagnostics;
        let network = normalize(&parsed.ast, &mut diagnostics);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        network
    }

    /// Order-independent fingerprint of a network, keyed by names.
    fn summary(net: &Network) -> Vec<String> {
        let mut lines = vec![
            format!("net {} {} {} {:?}", net.name, net.version, net.bus_type, net.comment),
            format!("tables {:?}", net.value_tables),
            format!("attrs {:?}", net.attributes),
        ];
        for spec in net
            .network_attr_spec
            .values()
            .chain(net.node_attr_spec.values())
            .chain(net.msg_attr_spec.values())
            .chain(net.sig_attr_spec.values())
        {
            lines.push(format!("spec {:?}", spec));
        }
        for node in net.iter_nodes() {
            lines.push(format!("node {} {:?} {:?}", node.name, node.comment, node.attributes));
        }
        for (mk, m) in net.iter_message_entries() {
            let senders: Vec<&str> = m.senders.iter().filter_map(|&k| net.node_name(k)).collect();
            lines.push(format!(
                "msg {} {} {} {} {:?} {:?} {:?} {:?}",
                m.id_format, m.id, m.name, m.byte_length, senders, m.comment, m.cycle_time_ms, m.attributes
            ));
            for (_, s) in net.message_signals(mk) {
                let receivers: Vec<&str> = s.receivers.iter().filter_map(|&k| net.node_name(k)).collect();
                let switch = s.mux.switch.and_then(|k| net.get_sig_by_key(k)).map(|x| x.name.clone());
                lines.push(format!(
                    "sig {} {} {} {:?} {:?} {} {} {} {} {:?} {:?} {:?} {:?} {:?} {:?} {:?} {:?}",
                    s.name,
                    s.start_bit,
                    s.width,
                    s.byte_order,
                    s.value_type,
                    s.scale,
                    s.offset,
                    s.min,
                    s.max,
                    s.unit,
                    receivers,
                    s.mux.role,
                    switch,
                    s.mux.selectors,
                    s.comment,
                    s.value_descriptions,
                    s.attributes
                ));
            }
        }
        lines
    }

    const SOURCE: &str = r#"VERSION "3.0"
BU_: Motor Gateway Dash
VAL_TABLE_ OnOff 0 "Off" 1 "On" ;
BO_ 2527679645 Motor_01: 8 Motor
 SG_ Status : 61|1@1+ (1,0) [0|1] "" Dash,Gateway
 SG_ Engine_Speed : 48|8@1+ (0.5,-10) [-10|117.5] "km/h" Dash
 SG_ Temp : 7|12@0- (0.1,0) [-204.8|204.7] "°C" Gateway
BO_ 708 Mux_04: 8 Gateway
 SG_ Page M : 0|8@1+ (1,0) [0|255] "" Dash
 SG_ Sub m1M : 8|4@1+ (1,0) [0|15] "" Dash
 SG_ Alpha m0 : 8|8@1+ (1,0) [0|255] "" Dash
 SG_ Beta m2 : 16|8@1+ (1,0) [0|255] "" Dash
 SG_ Gamma m3 : 16|32@1- (1,0) [0|0] "" Dash
BO_ 709 Fd: 12 Motor
 SG_ Wide : 0|64@1+ (1,0) [0|0] "" Vector__XXX
BO_TX_BU_ 2527679645 : Motor,Gateway;
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_DEF_ BO_ "GenMsgSendType" ENUM "Cyclic","OnEvent";
BA_DEF_ SG_ "GenSigStartValue" FLOAT 0 100000;
BA_DEF_ BU_ "NmStationAddress" HEX 0 255;
BA_DEF_ "DBName" STRING;
BA_DEF_DEF_ "GenMsgCycleTime" 100;
BA_DEF_DEF_ "GenMsgSendType" "Cyclic";
BA_ "DBName" "Body";
BA_ "NmStationAddress" BU_ Motor 17;
BA_ "GenMsgCycleTime" BO_ 2527679645 20;
BA_ "GenMsgSendType" BO_ 708 1;
BA_ "GenSigStartValue" SG_ 2527679645 Temp 2.5;
CM_ "Body network with \"quotes\"";
CM_ BU_ Dash "Instrument cluster";
CM_ BO_ 708 "Multiplexed page";
CM_ SG_ 2527679645 Status "Engine state";
VAL_ 2527679645 Status 0 "Off" 1 "On" ;
SIG_VALTYPE_ 708 Gamma : 1;
SG_MUL_VAL_ 708 Beta Page 2-2, 5-7;
SG_MUL_VAL_ 708 Gamma Sub 3-3;
"#;

    #[test]
    fn test_write_then_parse_is_idempotent() {
        let first = network(SOURCE);
        let text = to_dbc_string(&first).unwrap();
        let second = network(&text);
        assert_eq!(summary(&first), summary(&second));

        // A second rendering is byte-identical.
        assert_eq!(to_dbc_string(&second).unwrap(), text);
    }

    #[test]
    fn test_written_lines() {
        let net = network(SOURCE);
        let text = to_dbc_string(&net).unwrap();
        assert!(text.starts_with("VERSION \"3.0\"\n"));
        assert!(text.contains("BU_: Motor Gateway Dash\n"));
        assert!(text.contains("BO_ 2527679645 Motor_01: 8 Motor\n"));
        assert!(text.contains(
            " SG_ Engine_Speed : 48|8@1+ (0.5,-10) [-10|117.5] \"km/h\" Dash\n"
        ));
        assert!(text.contains(" SG_ Sub m1M : 8|4@1+ (1,0) [0|15] \"\" Dash\n"));
        assert!(text.contains(" SG_ Wide : 0|64@1+ (1,0) [0|0] \"\" Vector__XXX\n"));
        assert!(text.contains("BO_TX_BU_ 2527679645 : Motor,Gateway;\n"));
        assert!(text.contains("BA_DEF_ BO_ \"GenMsgSendType\" ENUM \"Cyclic\",\"OnEvent\";\n"));
        assert!(text.contains("BA_DEF_DEF_ \"GenMsgSendType\" 0;\n"));
        assert!(text.contains("BA_ \"GenMsgSendType\" BO_ 708 1;\n"));
        assert!(text.contains("CM_ \"Body network with \\\"quotes\\\"\";\n"));
        assert!(text.contains("SIG_VALTYPE_ 708 Gamma : 1;\n"));
        assert!(text.contains("SG_MUL_VAL_ 708 Beta Page 2-2, 5-7;\n"));
        assert!(text.contains("SG_MUL_VAL_ 708 Gamma Sub 3-3;\n"));
        // Plain mN signals need no extended entry.
        assert!(!text.contains("SG_MUL_VAL_ 708 Alpha"));
    }

    #[test]
    fn test_empty_network() {
        let text = to_dbc_string(&Network::default()).unwrap();
        assert!(text.contains("BU_:\n"));
        assert!(parse_str(&text).is_ok());
    }
}
