//! Lowering of an [`LdfFile`] into the shared [`Network`].
//!
//! LIN signals are declared once, globally, and placed into frames by name;
//! every placement becomes a little-endian [`Signal`] of its frame. Schedule
//! tables keep their frame references by name: a missing frame is reported by
//! the validator, not here.

use std::collections::HashMap;

use log::debug;

use crate::core::lexer::Position;
use crate::ldf::ast::{FrameDef, LdfFile, NodeAttributesDef, SignalDef};
use crate::normalize::{IntoNetwork, Resolver};
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::ReferenceKind;
use crate::types::lin::{EventTriggeredFrame, LinCluster, SignalEncoding, SporadicFrame};
use crate::types::message::{FrameKind, IdFormat, Message};
use crate::types::network::{BusType, MessageKey, Network, NodeKey, SignalKey};
use crate::types::node::{ConfigurableFrame, LinNodeAttributes};
use crate::types::schedule::{Schedule, ScheduleCommand};
use crate::types::signal::{ByteOrder, InitValue, Signal};

/// Frame identifier of the master request diagnostic frame.
pub const MASTER_REQ_ID: u32 = 0x3C;
/// Frame identifier of the slave response diagnostic frame.
pub const SLAVE_RESP_ID: u32 = 0x3D;

/// Largest raw value of a `width`-bit unsigned field.
pub(crate) fn raw_max(width: u16) -> u64 {
    match width {
        0 => 0,
        w if w >= 64 => u64::MAX,
        w => (1u64 << w) - 1,
    }
}

/// Unscaled little-endian LIN signal covering its whole raw range.
pub(crate) fn lin_signal(name: impl Into<String>, offset: u16, width: u16) -> Signal {
    let mut signal = Signal::new(name, offset, width, ByteOrder::LittleEndian);
    signal.max = raw_max(width) as f64;
    signal
}

/// Applies a signal encoding type: the first physical range gives the
/// scaling and physical limits, logical values become value descriptions.
pub(crate) fn apply_encoding(encoding: &SignalEncoding, signal: &mut Signal) {
    signal.encoding = Some(encoding.name.clone());
    if let Some(range) = encoding.physical() {
        let lo = range.raw_min as f64 * range.scale + range.offset;
        let hi = range.raw_max as f64 * range.scale + range.offset;
        signal.scale = range.scale;
        signal.offset = range.offset;
        signal.min = lo.min(hi);
        signal.max = lo.max(hi);
        signal.unit = range.unit.clone();
    }
    for (value, text) in encoding.logical_values() {
        if let Ok(value) = i64::try_from(value) {
            signal.value_descriptions.insert(value, text.to_string());
        }
    }
}

impl IntoNetwork for LdfFile {
    fn to_network(&self, diagnostics: &mut Diagnostics) -> Network {
        let mut builder = Builder {
            file: self,
            network: Network::new(self.channel_name.clone().unwrap_or_default(), BusType::Lin),
            signal_defs: HashMap::new(),
            master: None,
            slaves: Vec::new(),
            diagnostics,
        };
        builder.build();
        builder.network
    }
}

struct Builder<'a> {
    file: &'a LdfFile,
    network: Network,
    /// Global signal declarations with their resolved subscribers.
    signal_defs: HashMap<&'a str, (&'a SignalDef, Vec<NodeKey>)>,
    master: Option<NodeKey>,
    slaves: Vec<NodeKey>,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Builder<'a> {
    fn build(&mut self) {
        let file = self.file;
        self.network.version = file.language_version.clone();

        self.master = file
            .master
            .as_ref()
            .map(|m| self.network.add_node_if_absent(&m.name));
        self.slaves = file
            .slaves
            .iter()
            .map(|name| self.network.add_node_if_absent(name))
            .collect();

        self.signal_declarations();
        for def in &file.frames {
            self.frame(def, FrameKind::Unconditional);
        }
        self.diagnostic_frames();

        let mut cluster = LinCluster {
            protocol_version: file.protocol_version.clone(),
            language_version: file.language_version.clone(),
            speed_bps: file.speed_kbps * 1000.0,
            channel_name: file.channel_name.clone(),
            master: self.master,
            time_base_ms: file.master.as_ref().map_or(0.0, |m| m.time_base_ms),
            jitter_ms: file.master.as_ref().map_or(0.0, |m| m.jitter_ms),
            slaves: self.slaves.clone(),
            ..Default::default()
        };
        self.encodings(&mut cluster);
        self.special_frames(&mut cluster);
        self.network.lin = Some(cluster);

        for def in &file.node_attributes {
            self.node_attributes(def);
        }
        self.schedules();
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(&self.network, self.diagnostics)
    }

    fn nodes(&mut self, names: &[String], context: &str, pos: Position) -> Vec<NodeKey> {
        names
            .iter()
            .filter_map(|name| self.resolver().node(name, context, Some(pos)))
            .collect()
    }

    fn signal_declarations(&mut self) {
        let file = self.file;
        for def in file.signals.iter().chain(&file.diagnostic_signals) {
            let context = format!("signal '{}'", def.name);
            if let Some(publisher) = &def.publisher {
                self.resolver().node(publisher, &context, Some(def.pos));
            }
            let subscribers = self.nodes(&def.subscribers, &context, def.pos);
            self.signal_defs
                .entry(def.name.as_str())
                .or_insert((def, subscribers));
        }
    }

    fn frame(&mut self, def: &FrameDef, kind: FrameKind) -> MessageKey {
        let context = format!("frame '{}'", def.name);
        let mut message = Message::new(def.name.clone(), def.id, IdFormat::Lin, def.length);
        message.kind = kind;
        match &def.publisher {
            Some(publisher) => {
                if let Some(nk) = self.resolver().node(publisher, &context, Some(def.pos)) {
                    message.senders.push(nk);
                }
            }
            None if def.id == MASTER_REQ_ID => message.senders.extend(self.master),
            None => {}
        }
        let mk = self.network.add_message(message);

        for placed in &def.signals {
            let Some((decl, subscribers)) = self.signal_defs.get(placed.name.as_str()) else {
                self.resolver()
                    .report(ReferenceKind::Signal, &placed.name, &context, Some(placed.pos));
                continue;
            };
            let mut signal = lin_signal(decl.name.clone(), placed.offset, decl.width);
            signal.init_value = Some(decl.init.clone());
            signal.receivers = match (kind, subscribers.is_empty()) {
                (FrameKind::Diagnostic, true) => self.diagnostic_receivers(def.id),
                _ => subscribers.clone(),
            };
            self.network.add_signal(mk, signal);
        }
        mk
    }

    /// Slaves listen to master requests; the master listens to slave responses.
    fn diagnostic_receivers(&self, id: u32) -> Vec<NodeKey> {
        if id == MASTER_REQ_ID {
            self.slaves.clone()
        } else {
            self.master.into_iter().collect()
        }
    }

    fn diagnostic_frames(&mut self) {
        let file = self.file;
        for def in &file.diagnostic_frames {
            self.frame(def, FrameKind::Diagnostic);
        }
        let scheduled = file
            .schedule_tables
            .iter()
            .flat_map(|t| &t.entries)
            .any(|e| matches!(e.command, ScheduleCommand::MasterReq | ScheduleCommand::SlaveResp));
        if file.diagnostic_frames.is_empty() && scheduled {
            self.standard_diagnostic_frame("MasterReq", MASTER_REQ_ID, self.master);
            self.standard_diagnostic_frame("SlaveResp", SLAVE_RESP_ID, None);
        }
    }

    /// 8-byte diagnostic frame made of one byte signal per payload byte.
    fn standard_diagnostic_frame(&mut self, name: &str, id: u32, sender: Option<NodeKey>) {
        debug!("adding standard LIN diagnostic frame '{}'", name);
        let mut message = Message::new(name, id, IdFormat::Lin, 8);
        message.kind = FrameKind::Diagnostic;
        message.senders.extend(sender);
        let mk = self.network.add_message(message);
        let receivers = self.diagnostic_receivers(id);
        for byte in 0..8u16 {
            let mut signal = lin_signal(format!("{name}B{byte}"), byte * 8, 8);
            signal.init_value = Some(InitValue::Scalar(0));
            signal.receivers = receivers.clone();
            self.network.add_signal(mk, signal);
        }
    }

    fn encodings(&mut self, cluster: &mut LinCluster) {
        let file = self.file;
        for def in &file.encoding_types {
            cluster.encodings.insert(
                def.name.clone(),
                SignalEncoding {
                    name: def.name.clone(),
                    values: def.values.clone(),
                },
            );
        }
        for rep in &file.representations {
            let context = format!("signal representation '{}'", rep.encoding);
            let Some(encoding) = cluster.encodings.get(&rep.encoding) else {
                self.resolver()
                    .report(ReferenceKind::Encoding, &rep.encoding, &context, Some(rep.pos));
                continue;
            };
            for name in &rep.signals {
                let keys: Vec<SignalKey> = self
                    .network
                    .signals_order
                    .iter()
                    .copied()
                    .filter(|&k| self.network.signals.get(k).is_some_and(|s| &s.name == name))
                    .collect();
                if keys.is_empty() {
                    self.resolver()
                        .report(ReferenceKind::Signal, name, &context, Some(rep.pos));
                }
                for sk in keys {
                    if let Some(signal) = self.network.get_sig_by_key_mut(sk) {
                        apply_encoding(encoding, signal);
                    }
                }
            }
        }
    }

    fn messages(&mut self, names: &[String], context: &str, pos: Position) -> Vec<MessageKey> {
        names
            .iter()
            .filter_map(|name| self.resolver().message(name, context, Some(pos)))
            .collect()
    }

    fn special_frames(&mut self, cluster: &mut LinCluster) {
        let file = self.file;
        for def in &file.sporadic_frames {
            let context = format!("sporadic frame '{}'", def.name);
            cluster.sporadic_frames.push(SporadicFrame {
                name: def.name.clone(),
                frames: self.messages(&def.frames, &context, def.pos),
            });
        }
        for def in &file.event_triggered_frames {
            let context = format!("event triggered frame '{}'", def.name);
            cluster.event_triggered_frames.push(EventTriggeredFrame {
                name: def.name.clone(),
                collision_schedule: def.collision_schedule.clone(),
                id: def.id,
                frames: self.messages(&def.frames, &context, def.pos),
            });
        }
    }

    fn node_attributes(&mut self, def: &NodeAttributesDef) {
        let context = format!("node attributes of '{}'", def.node);
        let pos = Some(def.pos);
        let Some(nk) = self.resolver().node(&def.node, &context, pos) else {
            return;
        };
        let response_error = def
            .response_error
            .as_deref()
            .and_then(|name| self.resolver().global_signal(name, &context, pos));
        let fault_state_signals = def
            .fault_state_signals
            .iter()
            .filter_map(|name| self.resolver().global_signal(name, &context, pos))
            .collect();
        let configurable_frames = def
            .configurable_frames
            .iter()
            .map(|(name, message_id)| ConfigurableFrame {
                name: name.clone(),
                message_id: *message_id,
                frame: self.resolver().message(name, &context, pos),
            })
            .collect();

        let attributes = LinNodeAttributes {
            protocol_version: def.protocol.clone(),
            configured_nad: def.configured_nad,
            initial_nad: def.initial_nad,
            product_id: def.product_id,
            response_error,
            fault_state_signals,
            p2_min_ms: def.p2_min_ms,
            st_min_ms: def.st_min_ms,
            n_as_timeout_ms: def.n_as_timeout_ms,
            n_cr_timeout_ms: def.n_cr_timeout_ms,
            configurable_frames,
            ..Default::default()
        };
        if let Some(node) = self.network.get_node_by_key_mut(nk) {
            node.lin = Some(attributes);
        }
    }

    fn schedules(&mut self) {
        let file = self.file;
        for table in &file.schedule_tables {
            let context = format!("schedule table '{}'", table.name);
            for entry in &table.entries {
                if let Some(node) = entry.command.node_name() {
                    self.resolver().node(node, &context, Some(table.pos));
                }
            }
            let schedule = Schedule {
                name: table.name.clone(),
                entries: table.entries.clone(),
            };
            let scheduled: Vec<MessageKey> = schedule
                .frame_names()
                .filter_map(|name| self.network.get_msg_key_by_name(name))
                .collect();
            for mk in scheduled {
                if let Some(message) = self.network.get_message_by_key_mut(mk)
                    && !message.schedules.contains(&table.name)
                {
                    message.schedules.push(table.name.clone());
                }
            }
            self.network.schedules.push(schedule);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldf::parse::parse_str;
    use crate::normalize::normalize;
    use crate::types::node::ProductId;

    fn network(text: &str) -> (Network, Diagnostics) {
        let parsed = parse_str(text).unwrap();
        let mut diagnostics = parsed.diagnostics;
        let network = normalize(&parsed.ast, &mut diagnostics);
        (network, diagnostics)
    }

    const SAMPLE: &str = r#"
LIN_description_file;
LIN_protocol_version = "2.1";
LIN_language_version = "2.1";
LIN_speed = 19.2 kbps;
Channel_name = "Body";

Nodes {
  Master: BCM, 10 ms, 0.5 ms;
  Slaves: Wiper, Mirror;
}

Signals {
  WiperMode: 2, 0, BCM, Wiper;
  MirrorPos: 10, 512, BCM, Mirror;
  WiperError: 1, 0, Wiper, BCM;
  WiperSpeed: 8, 0, Wiper, BCM;
}

Frames {
  BCM_Cmd: 0x10, BCM, 4 {
    WiperMode, 0;
    MirrorPos, 8;
  }
  Wiper_Status: 0x11, Wiper, 2 {
    WiperError, 0;
    WiperSpeed, 8;
  }
}

Event_triggered_frames {
  ETF_Status: 0x3A, Wiper_Status;
}

Node_attributes {
  Wiper {
    LIN_protocol = "2.1";
    configured_NAD = 0x0A;
    product_id = 0x1234, 0x0001;
    response_error = WiperError;
    configurable_frames {
      BCM_Cmd;
      Wiper_Status;
    }
  }
}

Schedule_tables {
  Run {
    BCM_Cmd delay 10 ms;
    Wiper_Status delay 10 ms;
  }
  Diag {
    MasterReq delay 20 ms;
    SlaveResp delay 20 ms;
  }
}

Signal_encoding_types {
  ModeEnc {
    logical_value, 0, "off";
    logical_value, 1, "slow";
    logical_value, 2, "fast";
  }
  SpeedEnc {
    physical_value, 0, 250, 0.5, -10, "rpm";
    logical_value, 255, "invalid";
  }
}

Signal_representation {
  ModeEnc: WiperMode;
  SpeedEnc: WiperSpeed;
}
"#;

    #[test]
    fn test_normalize_sample() {
        let (net, diagnostics) = network(SAMPLE);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(net.name, "Body");
        assert_eq!(net.bus_type, BusType::Lin);
        assert_eq!(net.version, "2.1");

        let cmd = net.get_message_by_name("BCM_Cmd").unwrap();
        assert_eq!((cmd.id, cmd.id_format, cmd.byte_length), (0x10, IdFormat::Lin, 4));
        assert_eq!(cmd.senders, vec![net.get_node_key_by_name("BCM").unwrap()]);
        assert_eq!(cmd.schedules, vec!["Run"]);

        let pos = net.get_signal_by_name("BCM_Cmd", "MirrorPos").unwrap();
        assert_eq!((pos.start_bit, pos.width), (8, 10));
        assert_eq!(pos.byte_order, Some(ByteOrder::LittleEndian));
        assert_eq!(pos.max, 1023.0);
        assert_eq!(pos.init_value, Some(InitValue::Scalar(512)));

        let mirror = net.get_node_by_name("Mirror").unwrap();
        assert_eq!(
            mirror.messages_received,
            vec![
                net.get_msg_key_by_name("BCM_Cmd").unwrap(),
                net.get_msg_key_by_name("MasterReq").unwrap(),
            ]
        );

        let mode = net.get_signal_by_name("BCM_Cmd", "WiperMode").unwrap();
        assert_eq!(mode.encoding.as_deref(), Some("ModeEnc"));
        assert_eq!(mode.value_descriptions.get(&2).map(String::as_str), Some("fast"));

        let speed = net.get_signal_by_name("Wiper_Status", "WiperSpeed").unwrap();
        assert_eq!((speed.scale, speed.offset), (0.5, -10.0));
        assert_eq!((speed.min, speed.max), (-10.0, 115.0));
        assert_eq!(speed.unit, "rpm");
        assert_eq!(speed.value_descriptions.get(&255).map(String::as_str), Some("invalid"));

        let lin = net.lin.as_ref().unwrap();
        assert_eq!(lin.speed_bps, 19200.0);
        assert_eq!(lin.time_base_ms, 10.0);
        assert_eq!(lin.slaves.len(), 2);
        assert_eq!(
            lin.event_triggered_frames[0].frames,
            vec![net.get_msg_key_by_name("Wiper_Status").unwrap()]
        );

        let wiper = net.get_node_by_name("Wiper").unwrap().lin.as_ref().unwrap();
        assert_eq!(wiper.configured_nad, Some(0x0A));
        assert_eq!(
            wiper.product_id,
            Some(ProductId {
                supplier_id: 0x1234,
                function_id: 0x0001,
                variant: None
            })
        );
        assert_eq!(wiper.response_error, net.find_signal_key("WiperError"));
        assert_eq!(wiper.configurable_frames[1].frame, net.get_msg_key_by_name("Wiper_Status"));
    }

    #[test]
    fn test_standard_diagnostic_frames_are_added() {
        let (net, _) = network(SAMPLE);
        let req = net.get_message_by_name("MasterReq").unwrap();
        assert_eq!((req.id, req.byte_length, req.kind), (MASTER_REQ_ID, 8, FrameKind::Diagnostic));
        assert_eq!(req.senders, vec![net.get_node_key_by_name("BCM").unwrap()]);
        assert_eq!(req.signals.len(), 8);
        assert_eq!(req.schedules, vec!["Diag"]);
        let slaves = vec![
            net.get_node_key_by_name("Wiper").unwrap(),
            net.get_node_key_by_name("Mirror").unwrap(),
        ];
        let b0 = net.get_signal_by_name("MasterReq", "MasterReqB0").unwrap();
        assert_eq!(b0.receivers, slaves);
        for node in ["Wiper", "Mirror"] {
            let received = &net.get_node_by_name(node).unwrap().messages_received;
            assert!(received.contains(&net.get_msg_key_by_name("MasterReq").unwrap()));
        }

        let resp = net.get_message_by_name("SlaveResp").unwrap();
        assert!(resp.senders.is_empty());
        let b7 = net.get_signal_by_name("SlaveResp", "SlaveRespB7").unwrap();
        assert_eq!((b7.start_bit, b7.width), (56, 8));
        assert_eq!(b7.receivers, vec![net.get_node_key_by_name("BCM").unwrap()]);
    }

    #[test]
    fn test_unresolved_references_are_reported() {
        let text = "LIN_description_file;
Nodes { Master: M, 5 ms, 0 ms; Slaves: S; }
Signals { A: 8, 0, M, S, Ghost; B: 8, 0, M; }
Frames { F: 0x01, M, 2 { A, 0; Missing, 8; } }
Schedule_tables { T { F delay 5 ms; Undefined delay 5 ms; AssignNAD {Nobody} delay 5 ms; } }
Signal_representation { NoEnc: A; }
";
        let (net, diagnostics) = network(text);
        let errors: Vec<(ReferenceKind, String)> = diagnostics
            .reference_errors()
            .map(|e| (e.kind, e.name.clone()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (ReferenceKind::Node, "Ghost".to_string()),
                (ReferenceKind::Signal, "Missing".to_string()),
                (ReferenceKind::Encoding, "NoEnc".to_string()),
                (ReferenceKind::Node, "Nobody".to_string()),
            ]
        );
        // Frame references stay by name.
        let table = net.get_schedule_by_name("T").unwrap();
        assert_eq!(table.frame_names().collect::<Vec<_>>(), vec!["F", "Undefined"]);
        assert!(net.get_message_by_name("MasterReq").is_none());
    }
}
