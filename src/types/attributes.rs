use serde::Serialize;
use std::fmt;

use crate::core::strings::format_f64;

/// Attribute definition (`BA_DEF_`) paired with its default value (`BA_DEF_DEF_`).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AttributeSpec {
    /// Attribute name.
    pub name: String,
    /// Attribute kind.
    pub kind: AttrType,
    // optional fields for numbers
    pub int_min: Option<i64>,
    pub int_max: Option<i64>,
    pub hex_min: Option<u64>,
    pub hex_max: Option<u64>,
    pub float_min: Option<f64>,
    pub float_max: Option<f64>,
    // entries of an ENUM definition
    pub enum_values: Vec<String>,
    pub default: Option<AttributeValue>,
    pub type_of_object: AttrObject,
}

impl AttributeSpec {
    pub fn minimum_to_string(&self) -> String {
        match self.kind {
            AttrType::String | AttrType::Enum => String::new(),
            AttrType::Int => self.int_min.map(|v| v.to_string()).unwrap_or_default(),
            AttrType::Hex => self.hex_min.map(|v| v.to_string()).unwrap_or_default(),
            AttrType::Float => self.float_min.map(format_f64).unwrap_or_default(),
        }
    }

    pub fn maximum_to_string(&self) -> String {
        match self.kind {
            AttrType::String | AttrType::Enum => String::new(),
            AttrType::Int => self.int_max.map(|v| v.to_string()).unwrap_or_default(),
            AttrType::Hex => self.hex_max.map(|v| v.to_string()).unwrap_or_default(),
            AttrType::Float => self.float_max.map(format_f64).unwrap_or_default(),
        }
    }

    /// Interprets a numeric assignment according to this definition.
    ///
    /// Enum attributes are assigned by index in DBC files; the index is
    /// translated to the entry name when it is in range.
    pub fn value_from_number(&self, value: f64) -> AttributeValue {
        match self.kind {
            AttrType::Int => AttributeValue::Int(value as i64),
            AttrType::Hex => AttributeValue::Hex(value as u64),
            AttrType::Float => AttributeValue::Float(value),
            AttrType::Enum => {
                let idx = value as usize;
                match self.enum_values.get(idx) {
                    Some(entry) if value >= 0.0 => AttributeValue::Enum(entry.clone()),
                    _ => AttributeValue::Int(value as i64),
                }
            }
            AttrType::String => AttributeValue::Str(format_f64(value)),
        }
    }

    /// Interprets a string assignment according to this definition.
    pub fn value_from_string(&self, value: &str) -> AttributeValue {
        match self.kind {
            AttrType::Enum => AttributeValue::Enum(value.to_string()),
            _ => AttributeValue::Str(value.to_string()),
        }
    }
}

/// Attribute value kinds as declared by `BA_DEF_` lines in DBC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AttrType {
    #[default]
    String,
    Int,
    Hex,
    Float,
    Enum,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttrType::String => "STRING",
            AttrType::Int => "INT",
            AttrType::Hex => "HEX",
            AttrType::Float => "FLOAT",
            AttrType::Enum => "ENUM",
        })
    }
}

/// Concrete attribute value stored on network/node/message/signal entities.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Hex(u64),
    Float(f64),
    Enum(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Hex(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Str(_) | AttributeValue::Enum(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) | AttributeValue::Enum(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => write!(f, "{}", s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Hex(h) => write!(f, "0x{:X}", h),
            AttributeValue::Float(x) => f.write_str(&format_f64(*x)),
            AttributeValue::Enum(s) => write!(f, "{}", s),
        }
    }
}

/// The kind of object an attribute applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AttrObject {
    #[default]
    Network,
    Node,
    Message,
    Signal,
}

impl AttrObject {
    /// DBC keyword introducing the object in `BA_DEF_`/`BA_` lines.
    pub fn dbc_keyword(self) -> Option<&'static str> {
        match self {
            AttrObject::Network => None,
            AttrObject::Node => Some("BU_"),
            AttrObject::Message => Some("BO_"),
            AttrObject::Signal => Some("SG_"),
        }
    }
}

impl fmt::Display for AttrObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttrObject::Network => "Network",
            AttrObject::Node => "Node",
            AttrObject::Message => "Message",
            AttrObject::Signal => "Signal",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_assignment_by_index() {
        let spec = AttributeSpec {
            name: "GenMsgSendType".into(),
            kind: AttrType::Enum,
            enum_values: vec!["Cyclic".into(), "OnChange".into()],
            type_of_object: AttrObject::Message,
            ..Default::default()
        };
        assert_eq!(
            spec.value_from_number(1.0),
            AttributeValue::Enum("OnChange".into())
        );
        assert_eq!(spec.value_from_number(7.0), AttributeValue::Int(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::Hex(255).to_string(), "0xFF");
        assert_eq!(AttributeValue::Float(100.0).to_string(), "100");
        let spec = AttributeSpec {
            kind: AttrType::Float,
            float_min: Some(0.5),
            float_max: Some(10.0),
            ..Default::default()
        };
        assert_eq!(spec.minimum_to_string(), "0.5");
        assert_eq!(spec.maximum_to_string(), "10");
    }
}
