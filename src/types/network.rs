//! Network model (SlotMap-backed).
//!
//! The in-memory **network** produced by every format normalizer. Storage uses
//! **SlotMap** arenas with **stable keys**: [`NodeKey`], [`MessageKey`], [`SignalKey`].
//! Public iteration follows **order vectors** via `iter_nodes()`, `iter_messages()`,
//! `iter_signals()`, so entities are visited in declaration order.
//!
//! **Lookups** are O(1): `get_message_by_id/_name`, `get_node_by_name`, `get_signal_by_name`.
//! Signal names are scoped by their message (two messages may carry equally named signals).
//!
//! The network is built once by a normalizer and read-only afterwards.

use serde::Serialize;
use slotmap::{SlotMap, new_key_type};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::types::{
    attributes::{AttributeSpec, AttributeValue},
    lin::LinCluster,
    message::{IdFormat, Message},
    node::Node,
    schedule::Schedule,
    signal::{MuxRole, MuxSelector, Signal},
};

// --- Stable keys (SlotMap) ---
new_key_type! { pub struct NodeKey; }
new_key_type! { pub struct MessageKey; }
new_key_type! { pub struct SignalKey; }

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum BusType {
    #[default]
    Can,
    CanFd,
    Lin,
    Other(String),
}

impl BusType {
    /// Largest payload a frame of this bus can carry, in bytes.
    pub fn max_payload(&self) -> Option<u16> {
        match self {
            BusType::Can | BusType::Lin => Some(8),
            BusType::CanFd => Some(64),
            BusType::Other(_) => None,
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::Can => f.write_str("CAN"),
            BusType::CanFd => f.write_str("CAN FD"),
            BusType::Lin => f.write_str("LIN"),
            BusType::Other(name) => f.write_str(name),
        }
    }
}

/// Signals gated by the same multiplexor with the same selector.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiplexGroup {
    pub multiplexor: SignalKey,
    pub selector: MuxSelector,
    pub signals: Vec<SignalKey>,
}

/// In-memory representation of a communication network.
///
/// Holds metadata (name, bus type, version), the arenas of nodes/messages/signals
/// (SlotMaps with stable keys), order vectors fixing iteration order, schedule
/// tables, attribute definitions, and lookup maps for efficient queries.
#[derive(Default, Clone, Debug, Serialize)]
pub struct Network {
    // --- General information ---
    pub name: String,
    pub bus_type: BusType,
    /// Format version string (DBC `VERSION`, LDF language version).
    pub version: String,
    /// Network comment (DBC `CM_ "..."`).
    pub comment: String,

    // --- Main storage (stable-key maps) ---
    pub nodes: SlotMap<NodeKey, Node>,
    pub messages: SlotMap<MessageKey, Message>,
    pub signals: SlotMap<SignalKey, Signal>,

    // --- Order "views" ---
    pub nodes_order: Vec<NodeKey>,
    pub messages_order: Vec<MessageKey>,
    pub signals_order: Vec<SignalKey>,

    /// LIN schedule tables, in declaration order.
    pub schedules: Vec<Schedule>,
    /// Named value tables (DBC `VAL_TABLE_`).
    pub value_tables: BTreeMap<String, BTreeMap<i64, String>>,
    /// LIN cluster settings. `None` for CAN networks.
    pub lin: Option<LinCluster>,

    // --- Network Attribute Entry ---
    pub attributes: BTreeMap<String, AttributeValue>,

    // --- Attributes Spec ---
    pub network_attr_spec: BTreeMap<String, AttributeSpec>,
    pub node_attr_spec: BTreeMap<String, AttributeSpec>,
    pub msg_attr_spec: BTreeMap<String, AttributeSpec>,
    pub sig_attr_spec: BTreeMap<String, AttributeSpec>,

    // --- Lookups ---
    #[serde(skip)]
    node_key_by_name: HashMap<String, NodeKey>,
    #[serde(skip)]
    msg_key_by_id: HashMap<(IdFormat, u32), MessageKey>,
    #[serde(skip)]
    msg_key_by_name: HashMap<String, MessageKey>,
    #[serde(skip)]
    sig_key_by_name: HashMap<(MessageKey, String), SignalKey>,
}

impl Network {
    pub fn new(name: impl Into<String>, bus_type: BusType) -> Self {
        Network {
            name: name.into(),
            bus_type,
            ..Default::default()
        }
    }

    // --------- Nodes --------
    /// Adds a node if not already present and returns the corresponding `NodeKey`.
    pub fn add_node_if_absent(&mut self, name: &str) -> NodeKey {
        if let Some(r) = self.get_node_key_by_name(name) {
            return r;
        }
        let key: NodeKey = self.nodes.insert(Node {
            name: name.to_string(),
            ..Default::default()
        });
        self.nodes_order.push(key);
        self.node_key_by_name.insert(name.to_string(), key);
        key
    }

    /// Records `nk` as a transmitter of `mk` on both sides. No duplicates.
    pub fn add_tx_msg_for_node(&mut self, nk: NodeKey, mk: MessageKey) {
        if !self.nodes.contains_key(nk) {
            return;
        }
        if let Some(msg) = self.messages.get_mut(mk) {
            if !msg.senders.contains(&nk) {
                msg.senders.push(nk);
            }
        } else {
            return;
        }
        if let Some(node) = self.nodes.get_mut(nk)
            && !node.messages_sent.contains(&mk)
        {
            node.messages_sent.push(mk);
        }
    }

    /// Records `nk` as a receiver of `mk`. No duplicates.
    pub fn add_rx_msg_for_node(&mut self, nk: NodeKey, mk: MessageKey) {
        if !self.messages.contains_key(mk) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(nk)
            && !node.messages_received.contains(&mk)
        {
            node.messages_received.push(mk);
        }
    }

    pub fn get_node_key_by_name(&self, name: &str) -> Option<NodeKey> {
        self.node_key_by_name.get(name).copied()
    }

    pub fn get_node_by_key(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn get_node_by_key_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<&Node> {
        self.get_node_by_key(self.get_node_key_by_name(name)?)
    }

    /// Name of a node, for rendering references.
    pub fn node_name(&self, key: NodeKey) -> Option<&str> {
        self.nodes.get(key).map(|n| n.name.as_str())
    }

    // ------------- Messages ------------
    /// Inserts a message and indexes its id/name.
    ///
    /// Duplicate names or identifiers are stored as-is (the validator reports
    /// them); lookups keep resolving to the first declaration.
    pub fn add_message(&mut self, message: Message) -> MessageKey {
        let senders: Vec<NodeKey> = message.senders.clone();
        let id_key = (message.id_format, message.id);
        let name = message.name.clone();

        let msg_key: MessageKey = self.messages.insert(Message {
            senders: Vec::new(),
            signals: Vec::new(),
            ..message
        });
        self.messages_order.push(msg_key);
        self.msg_key_by_id.entry(id_key).or_insert(msg_key);
        self.msg_key_by_name.entry(name).or_insert(msg_key);

        for nk in senders {
            self.add_tx_msg_for_node(nk, msg_key);
        }
        msg_key
    }

    pub fn get_msg_key_by_name(&self, name: &str) -> Option<MessageKey> {
        self.msg_key_by_name.get(name).copied()
    }

    pub fn get_msg_key_by_id(&self, id_format: IdFormat, id: u32) -> Option<MessageKey> {
        self.msg_key_by_id.get(&(id_format, id)).copied()
    }

    pub fn get_message_by_key(&self, key: MessageKey) -> Option<&Message> {
        self.messages.get(key)
    }

    pub fn get_message_by_key_mut(&mut self, key: MessageKey) -> Option<&mut Message> {
        self.messages.get_mut(key)
    }

    pub fn get_message_by_name(&self, name: &str) -> Option<&Message> {
        self.get_message_by_key(self.get_msg_key_by_name(name)?)
    }

    pub fn get_message_by_id(&self, id_format: IdFormat, id: u32) -> Option<&Message> {
        self.get_message_by_key(self.get_msg_key_by_id(id_format, id)?)
    }

    // -------------- Signals ------------
    /// Appends a signal to message `mk`. Returns `None` when the message does not exist.
    ///
    /// Receivers of the signal become receivers of the message.
    pub fn add_signal(&mut self, mk: MessageKey, signal: Signal) -> Option<SignalKey> {
        if !self.messages.contains_key(mk) {
            return None;
        }
        let receivers: Vec<NodeKey> = signal.receivers.clone();
        let name = signal.name.clone();

        let sig_key: SignalKey = self.signals.insert(Signal {
            message: mk,
            ..signal
        });
        self.signals_order.push(sig_key);
        if let Some(m) = self.messages.get_mut(mk) {
            m.signals.push(sig_key);
        }
        self.sig_key_by_name.entry((mk, name)).or_insert(sig_key);

        for nk in receivers {
            self.add_rx_msg_for_node(nk, mk);
        }
        Some(sig_key)
    }

    pub fn get_sig_key_by_name(&self, mk: MessageKey, name: &str) -> Option<SignalKey> {
        self.sig_key_by_name.get(&(mk, name.to_string())).copied()
    }

    pub fn get_sig_by_key(&self, key: SignalKey) -> Option<&Signal> {
        self.signals.get(key)
    }

    pub fn get_sig_by_key_mut(&mut self, key: SignalKey) -> Option<&mut Signal> {
        self.signals.get_mut(key)
    }

    /// Returns a signal given its message name and its own name.
    pub fn get_signal_by_name(&self, message: &str, signal: &str) -> Option<&Signal> {
        let mk = self.get_msg_key_by_name(message)?;
        self.get_sig_by_key(self.get_sig_key_by_name(mk, signal)?)
    }

    /// First signal named `name` in any message (LIN signal names are global).
    pub fn find_signal_key(&self, name: &str) -> Option<SignalKey> {
        self.signals_order
            .iter()
            .copied()
            .find(|&k| self.signals.get(k).is_some_and(|s| s.name == name))
    }

    // -------------- Iteration ------------
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes_order.iter().filter_map(|&k| self.nodes.get(k))
    }

    pub fn iter_messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages_order
            .iter()
            .filter_map(|&k| self.messages.get(k))
    }

    /// Messages with their keys, in declaration order.
    pub fn iter_message_entries(&self) -> impl Iterator<Item = (MessageKey, &Message)> + '_ {
        self.messages_order
            .iter()
            .filter_map(|&k| self.messages.get(k).map(|m| (k, m)))
    }

    pub fn iter_signals(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.signals_order
            .iter()
            .filter_map(|&k| self.signals.get(k))
    }

    /// Signals of one message with their keys, in declaration order.
    pub fn message_signals(&self, mk: MessageKey) -> Vec<(SignalKey, &Signal)> {
        let Some(message) = self.messages.get(mk) else {
            return Vec::new();
        };
        message
            .signals
            .iter()
            .filter_map(|&sk| self.signals.get(sk).map(|s| (sk, s)))
            .collect()
    }

    /// Top-level multiplexor switches of a message.
    pub fn multiplexors(&self, mk: MessageKey) -> Vec<SignalKey> {
        self.message_signals(mk)
            .into_iter()
            .filter(|(_, s)| s.mux.role == MuxRole::Multiplexor)
            .map(|(k, _)| k)
            .collect()
    }

    /// Groups the gated signals of a message by (switch, selector).
    pub fn multiplex_groups(&self, mk: MessageKey) -> Vec<MultiplexGroup> {
        let mut groups: Vec<MultiplexGroup> = Vec::new();
        for (sk, signal) in self.message_signals(mk) {
            let Some(switch) = signal.mux.switch else {
                continue;
            };
            for selector in &signal.mux.selectors {
                match groups
                    .iter_mut()
                    .find(|g| g.multiplexor == switch && g.selector == *selector)
                {
                    Some(group) => group.signals.push(sk),
                    None => groups.push(MultiplexGroup {
                        multiplexor: switch,
                        selector: *selector,
                        signals: vec![sk],
                    }),
                }
            }
        }
        groups
    }

    pub fn get_schedule_by_name(&self, name: &str) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::signal::{ByteOrder, MuxInfo};

    #[test]
    fn test_add_and_lookup() {
        let mut net = Network::new("demo", BusType::Can);
        let ecu = net.add_node_if_absent("ECU");
        assert_eq!(net.add_node_if_absent("ECU"), ecu);

        let mut msg = Message::new("Status", 0x100, IdFormat::Standard, 8);
        msg.senders.push(ecu);
        let mk = net.add_message(msg);

        let abs = net.add_node_if_absent("ABS");
        let mut sig = Signal::new("Speed", 0, 16, ByteOrder::LittleEndian);
        sig.receivers.push(abs);
        let sk = net.add_signal(mk, sig).unwrap();

        assert_eq!(net.get_msg_key_by_id(IdFormat::Standard, 0x100), Some(mk));
        assert_eq!(net.get_msg_key_by_id(IdFormat::Extended, 0x100), None);
        assert_eq!(net.get_sig_key_by_name(mk, "Speed"), Some(sk));
        assert_eq!(net.get_sig_by_key(sk).unwrap().message, mk);
        assert_eq!(net.get_signal_by_name("Status", "Speed").unwrap().width, 16);
        assert_eq!(net.get_node_by_name("ECU").unwrap().messages_sent, vec![mk]);
        assert_eq!(net.get_node_by_name("ABS").unwrap().messages_received, vec![mk]);
        assert_eq!(net.get_message_by_key(mk).unwrap().senders, vec![ecu]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let mut net = Network::new("demo", BusType::Can);
        let first = net.add_message(Message::new("A", 1, IdFormat::Standard, 8));
        let second = net.add_message(Message::new("A", 2, IdFormat::Standard, 8));
        assert_ne!(first, second);
        assert_eq!(net.get_msg_key_by_name("A"), Some(first));
        assert_eq!(net.iter_messages().count(), 2);
    }

    #[test]
    fn test_multiplex_groups() {
        let mut net = Network::new("demo", BusType::Can);
        let mk = net.add_message(Message::new("Mux", 1, IdFormat::Standard, 8));
        let mut switch = Signal::new("Sel", 0, 8, ByteOrder::LittleEndian);
        switch.mux.role = MuxRole::Multiplexor;
        let sw = net.add_signal(mk, switch).unwrap();
        for (name, sel) in [("A", 0), ("B", 1), ("C", 0)] {
            let mut s = Signal::new(name, 8, 8, ByteOrder::LittleEndian);
            s.mux = MuxInfo {
                role: MuxRole::Multiplexed,
                switch: Some(sw),
                selectors: vec![MuxSelector::Value(sel)],
            };
            net.add_signal(mk, s);
        }
        let groups = net.multiplex_groups(mk);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].selector, MuxSelector::Value(0));
        assert_eq!(groups[0].signals.len(), 2);
        assert_eq!(net.multiplexors(mk), vec![sw]);
    }
}
