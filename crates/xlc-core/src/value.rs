//! Canonical typed values produced by coercion

use crate::types::Builtin;
use bigdecimal::{BigDecimal, Zero};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

/// A fully coerced cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Signed integer family (sbyte, short, int, long)
    Int(i64),
    /// Unsigned integer family (byte, ushort, uint, ulong)
    UInt(u64),
    /// float and double
    Float(f64),
    Decimal(DecimalValue),
    /// Seconds since the Unix epoch
    DateTime(i64),
    Char(char),
    String(String),
    Enum(String),
    List(Vec<Value>),
    /// Ordered key/value pairs; keys are unique
    Map(Vec<(Value, Value)>),
    /// Struct/class instance in declared field order
    Record(Vec<(String, Value)>),
}

/// Arbitrary precision decimal, extended with NaN
#[derive(Debug, Clone, PartialEq)]
pub enum DecimalValue {
    Number(BigDecimal),
    NaN,
}

impl DecimalValue {
    pub fn is_nan(&self) -> bool {
        matches!(self, DecimalValue::NaN)
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalValue::Number(d) => write!(f, "{d}"),
            DecimalValue::NaN => f.write_str("NaN"),
        }
    }
}

impl Value {
    /// The zero value of a builtin type
    pub fn zero(builtin: Builtin) -> Self {
        match builtin {
            Builtin::SByte | Builtin::Short | Builtin::Int | Builtin::Long => Value::Int(0),
            Builtin::Byte | Builtin::UShort | Builtin::UInt | Builtin::ULong => Value::UInt(0),
            Builtin::Float | Builtin::Double => Value::Float(0.0),
            Builtin::Decimal => Value::Decimal(DecimalValue::Number(BigDecimal::zero())),
            Builtin::Bool => Value::Bool(false),
            Builtin::DateTime => Value::DateTime(0),
            Builtin::String => Value::String(String::new()),
            Builtin::Char => Value::Char('\0'),
        }
    }

    /// Insert into a map value's entries, replacing an existing key in place
    pub fn insert_entry(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a field of a record value
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::DateTime(t) => write!(f, "{t}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::String(s) | Value::Enum(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) | Value::DateTime(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(x) => serializer.serialize_f64(*x),
            // decimals keep their precision as strings
            Value::Decimal(d) => serializer.collect_str(d),
            Value::Char(c) => serializer.serialize_char(*c),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, v) in fields {
                    map.serialize_entry(name, v)?;
                }
                map.end()
            }
        }
    }
}
