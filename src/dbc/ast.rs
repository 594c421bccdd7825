//! DBC syntax tree.
//!
//! A faithful, unresolved rendering of the file: identifiers are kept as
//! written (raw message identifiers include the extended-frame flag bit) and
//! cross references are plain names. Resolution happens in the normalizer.

use crate::core::lexer::Position;
use crate::types::attributes::AttrObject;
use crate::types::signal::ByteOrder;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbcFile {
    pub version: Option<String>,
    /// Symbols listed under `NS_`.
    pub new_symbols: Vec<String>,
    /// `BU_` node names.
    pub nodes: Vec<String>,
    pub value_tables: Vec<ValueTableDef>,
    pub messages: Vec<MessageDef>,
    pub tx_nodes: Vec<TxNodesDef>,
    pub comments: Vec<CommentDef>,
    pub attribute_defs: Vec<AttributeDef>,
    pub attribute_defaults: Vec<AttributeDefault>,
    pub attribute_values: Vec<AttributeAssignment>,
    pub value_descriptions: Vec<ValueDescription>,
    pub signal_value_types: Vec<SignalValueType>,
    pub extended_mux: Vec<ExtendedMux>,
}

/// `VAL_TABLE_ name 0 "Off" 1 "On" ;`
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTableDef {
    pub name: String,
    pub entries: Vec<(i64, String)>,
    pub pos: Position,
}

/// `BO_ <raw id> <name>: <dlc> <transmitter>` and its `SG_` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDef {
    /// Identifier as written; bit 31 flags an extended frame.
    pub raw_id: u32,
    pub name: String,
    pub dlc: u16,
    pub transmitter: String,
    pub signals: Vec<SignalDef>,
    pub pos: Position,
}

/// Multiplexing indicator following a signal name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MuxTag {
    #[default]
    None,
    /// `M`
    Multiplexor,
    /// `mN`
    Multiplexed(u64),
    /// `mNM`
    MultiplexedMultiplexor(u64),
}

/// `SG_ <name> [mux] : <start>|<width>@<order><sign> (<scale>,<offset>) [<min>|<max>] "<unit>" <receivers>`
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDef {
    pub name: String,
    pub mux: MuxTag,
    pub start_bit: u16,
    pub width: u16,
    /// `None` when the `@` clause is missing.
    pub byte_order: Option<ByteOrder>,
    pub signed: bool,
    pub scale: f64,
    pub offset: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub receivers: Vec<String>,
    pub pos: Position,
}

/// `BO_TX_BU_ <raw id> : <node>, <node> ;`
#[derive(Debug, Clone, PartialEq)]
pub struct TxNodesDef {
    pub raw_id: u32,
    pub nodes: Vec<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRef {
    Network,
    Node(String),
    Message(u32),
    Signal(u32, String),
    EnvVar(String),
}

/// `CM_ [object] "text" ;`
#[derive(Debug, Clone, PartialEq)]
pub struct CommentDef {
    pub target: ObjectRef,
    pub text: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKindDef {
    Int { min: i64, max: i64 },
    Hex { min: u64, max: u64 },
    Float { min: f64, max: f64 },
    String,
    Enum(Vec<String>),
}

/// `BA_DEF_ [BU_|BO_|SG_|EV_] "name" <kind> ;`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    /// `None` for environment-variable attributes, which have no IR counterpart.
    pub object: Option<AttrObject>,
    pub name: String,
    pub kind: AttributeKindDef,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeLiteral {
    Number(f64),
    Str(String),
}

/// `BA_DEF_DEF_ "name" <value> ;`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefault {
    pub name: String,
    pub value: AttributeLiteral,
    pub pos: Position,
}

/// `BA_ "name" [object] <value> ;`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAssignment {
    pub name: String,
    pub target: ObjectRef,
    pub value: AttributeLiteral,
    pub pos: Position,
}

/// `VAL_ <raw id> <signal> 0 "Off" 1 "On" ;` (or an environment variable)
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDescription {
    pub target: ObjectRef,
    pub entries: Vec<(i64, String)>,
    pub pos: Position,
}

/// `SIG_VALTYPE_ <raw id> <signal> : <0|1|2> ;`
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValueType {
    pub raw_id: u32,
    pub signal: String,
    pub code: u8,
    pub pos: Position,
}

/// `SG_MUL_VAL_ <raw id> <signal> <switch> 0-3, 5-5 ;`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedMux {
    pub raw_id: u32,
    pub signal: String,
    pub switch: String,
    pub ranges: Vec<(u64, u64)>,
    pub pos: Position,
}
