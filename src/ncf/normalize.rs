//! Lowering of an [`NcfFile`] into the shared [`Network`].
//!
//! Every described node becomes a LIN slave. Its published frames are sent by
//! it, its subscribed frames are received by it; a frame named by several
//! nodes is built once and gains the other nodes as sender or receiver.
//! Frames without `message_id` get the lowest free identifier, in declaration
//! order.

use std::collections::BTreeSet;

use log::debug;

use crate::ldf::normalize::{apply_encoding, lin_signal};
use crate::ncf::ast::{Direction, NcfFile, NcfFrameDef, NodeCapabilityDef};
use crate::normalize::{IntoNetwork, Resolver};
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::ReferenceKind;
use crate::types::lin::{LinCluster, SignalEncoding};
use crate::types::message::{IdFormat, Message};
use crate::types::network::{BusType, MessageKey, Network, NodeKey};
use crate::types::node::{ConfigurableFrame, LinNodeAttributes, ProductId};

/// Highest identifier of an unconditional LIN frame.
pub const MAX_UNCONDITIONAL_ID: u32 = 0x3B;

impl IntoNetwork for NcfFile {
    fn to_network(&self, diagnostics: &mut Diagnostics) -> Network {
        let name = self.nodes.first().map(|n| n.name.clone()).unwrap_or_default();
        let mut builder = Builder {
            file: self,
            network: Network::new(name, BusType::Lin),
            used_ids: self
                .nodes
                .iter()
                .flat_map(|n| &n.frames)
                .filter_map(|f| f.message_id)
                .collect(),
            diagnostics,
        };
        builder.build();
        builder.network
    }
}

struct Builder<'a> {
    file: &'a NcfFile,
    network: Network,
    used_ids: BTreeSet<u32>,
    diagnostics: &'a mut Diagnostics,
}

impl Builder<'_> {
    fn build(&mut self) {
        let file = self.file;
        self.network.version = file.language_version.clone();

        let mut cluster = LinCluster {
            language_version: file.language_version.clone(),
            ..Default::default()
        };
        for node in &file.nodes {
            let nk = self.network.add_node_if_absent(&node.name);
            cluster.slaves.push(nk);
            if cluster.protocol_version.is_empty()
                && let Some(version) = &node.general.protocol_version
            {
                cluster.protocol_version = version.clone();
            }
            if let Some(kbps) = node.general.bitrate.as_ref().and_then(|b| b.max_kbps()) {
                cluster.speed_bps = cluster.speed_bps.max(kbps * 1000.0);
            }
        }

        for node in &file.nodes {
            let encodings: Vec<SignalEncoding> = node
                .encodings
                .iter()
                .map(|def| SignalEncoding {
                    name: def.name.clone(),
                    values: def.values.clone(),
                })
                .collect();
            let mut frames = Vec::new();
            for def in &node.frames {
                if let Some(mk) = self.frame(node, def, &encodings) {
                    frames.push((def, mk));
                }
            }
            self.node_attributes(node, &frames);
            for encoding in encodings {
                cluster.encodings.entry(encoding.name.clone()).or_insert(encoding);
            }
        }
        self.network.lin = Some(cluster);
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(&self.network, self.diagnostics)
    }

    fn next_free_id(&mut self) -> Option<u32> {
        let id = (0..=MAX_UNCONDITIONAL_ID).find(|id| !self.used_ids.contains(id))?;
        self.used_ids.insert(id);
        Some(id)
    }

    fn frame(
        &mut self,
        node: &NodeCapabilityDef,
        def: &NcfFrameDef,
        encodings: &[SignalEncoding],
    ) -> Option<MessageKey> {
        let nk = self.network.get_node_key_by_name(&node.name)?;
        if let Some(mk) = self.network.get_msg_key_by_name(&def.name) {
            self.join_frame(mk, nk, def.direction);
            return Some(mk);
        }

        let id = match def.message_id {
            Some(id) => id,
            None => {
                let Some(id) = self.next_free_id() else {
                    self.diagnostics.warn(
                        Some(def.pos),
                        format!("no free frame identifier left for frame '{}'", def.name),
                    );
                    return None;
                };
                debug!("assigned identifier {:#04x} to frame '{}'", id, def.name);
                id
            }
        };
        let length = def.length.unwrap_or_else(|| {
            let bits = def
                .signals
                .iter()
                .map(|s| u32::from(s.offset) + u32::from(s.size))
                .max()
                .unwrap_or(0);
            u16::try_from(bits.div_ceil(8)).unwrap_or(u16::MAX)
        });

        let mut message = Message::new(def.name.clone(), id, IdFormat::Lin, length);
        message.cycle_time_ms = def.max_period_ms;
        if def.direction == Direction::Publish {
            message.senders.push(nk);
        }
        let mk = self.network.add_message(message);

        let context = format!("frame '{}'", def.name);
        for sig in &def.signals {
            let mut signal = lin_signal(sig.name.clone(), sig.offset, sig.size);
            signal.init_value = Some(sig.init.clone());
            if def.direction == Direction::Subscribe {
                signal.receivers.push(nk);
            }
            if let Some(name) = &sig.encoding {
                match encodings.iter().find(|e| &e.name == name) {
                    Some(encoding) => apply_encoding(encoding, &mut signal),
                    None => self.resolver().report(
                        ReferenceKind::Encoding,
                        name,
                        &context,
                        Some(sig.pos),
                    ),
                }
            }
            self.network.add_signal(mk, signal);
        }
        Some(mk)
    }

    /// A frame already built from another node's description.
    fn join_frame(&mut self, mk: MessageKey, nk: NodeKey, direction: Direction) {
        match direction {
            Direction::Publish => self.network.add_tx_msg_for_node(nk, mk),
            Direction::Subscribe => {
                let keys = self.network.get_message_by_key(mk).map(|m| m.signals.clone());
                for sk in keys.unwrap_or_default() {
                    if let Some(signal) = self.network.get_sig_by_key_mut(sk)
                        && !signal.receivers.contains(&nk)
                    {
                        signal.receivers.push(nk);
                    }
                }
                self.network.add_rx_msg_for_node(nk, mk);
            }
        }
    }

    fn node_attributes(&mut self, node: &NodeCapabilityDef, frames: &[(&NcfFrameDef, MessageKey)]) {
        let context = format!("status management of '{}'", node.name);
        let pos = Some(node.pos);
        let response_error = node
            .response_error
            .as_deref()
            .and_then(|name| self.resolver().global_signal(name, &context, pos));
        let fault_state_signals = node
            .fault_state_signals
            .iter()
            .filter_map(|name| self.resolver().global_signal(name, &context, pos))
            .collect();
        let configurable_frames = frames
            .iter()
            .map(|(def, mk)| ConfigurableFrame {
                name: def.name.clone(),
                message_id: self.network.get_message_by_key(*mk).map(|m| m.id),
                frame: Some(*mk),
            })
            .collect();
        let general = &node.general;
        let product_id = match (general.supplier, general.function) {
            (Some(supplier_id), Some(function_id)) => Some(ProductId {
                supplier_id,
                function_id,
                variant: general.variant,
            }),
            _ => None,
        };

        let attributes = LinNodeAttributes {
            protocol_version: general.protocol_version.clone(),
            initial_nad: node.diagnostic.nad.first().copied(),
            nad_set: node.diagnostic.nad.clone(),
            product_id,
            response_error,
            fault_state_signals,
            p2_min_ms: node.diagnostic.p2_min_ms,
            st_min_ms: node.diagnostic.st_min_ms,
            configurable_frames,
            bitrate_bps: general
                .bitrate
                .as_ref()
                .and_then(|b| b.max_kbps())
                .map(|kbps| kbps * 1000.0),
            sends_wake_up_signal: general.sends_wake_up_signal,
            diagnostic_class: node.diagnostic.diagnostic_class,
            supported_sids: node.diagnostic.supported_sids.clone(),
            free_text: node.free_text.clone(),
            ..Default::default()
        };
        if let Some(nk) = self.network.get_node_key_by_name(&node.name)
            && let Some(n) = self.network.get_node_by_key_mut(nk)
        {
            n.lin = Some(attributes);
        }
    }
}
