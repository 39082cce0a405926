//! Type descriptors: the builtin scalar set and the parsed form of field type text
//!
//! Field types are written as text in the sheet header (`int`, `list<Item>`,
//! `map<string,list<int>>`). They are parsed once into a [`TypeDescriptor`]
//! and every later stage matches on that tree instead of re-inspecting text.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Builtin scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Int,
    Long,
    Byte,
    SByte,
    Short,
    UInt,
    ULong,
    UShort,
    Float,
    Double,
    Decimal,
    Bool,
    DateTime,
    String,
    Char,
}

impl Builtin {
    pub const ALL: [Builtin; 15] = [
        Builtin::Int,
        Builtin::Long,
        Builtin::Byte,
        Builtin::SByte,
        Builtin::Short,
        Builtin::UInt,
        Builtin::ULong,
        Builtin::UShort,
        Builtin::Float,
        Builtin::Double,
        Builtin::Decimal,
        Builtin::Bool,
        Builtin::DateTime,
        Builtin::String,
        Builtin::Char,
    ];

    /// Look up a builtin by its (case-sensitive) name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Int => "int",
            Builtin::Long => "long",
            Builtin::Byte => "byte",
            Builtin::SByte => "sbyte",
            Builtin::Short => "short",
            Builtin::UInt => "uint",
            Builtin::ULong => "ulong",
            Builtin::UShort => "ushort",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::Decimal => "decimal",
            Builtin::Bool => "bool",
            Builtin::DateTime => "datetime",
            Builtin::String => "string",
            Builtin::Char => "char",
        }
    }

    /// Bit width and signedness of the integer family, `None` for other types
    pub fn integer_width(self) -> Option<(u32, bool)> {
        match self {
            Builtin::SByte => Some((8, true)),
            Builtin::Byte => Some((8, false)),
            Builtin::Short => Some((16, true)),
            Builtin::UShort => Some((16, false)),
            Builtin::Int => Some((32, true)),
            Builtin::UInt => Some((32, false)),
            Builtin::Long => Some((64, true)),
            Builtin::ULong => Some((64, false)),
            _ => None,
        }
    }

    /// Inclusive `[min, max]` of the integer family
    pub fn integer_bounds(self) -> Option<(i128, i128)> {
        self.integer_width().map(|(bits, signed)| {
            if signed {
                (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
            } else {
                (0, (1i128 << bits) - 1)
            }
        })
    }

    pub fn is_integer(self) -> bool {
        self.integer_width().is_some()
    }

    pub fn is_real(self) -> bool {
        matches!(self, Builtin::Float | Builtin::Double | Builtin::Decimal)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a type text could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("empty type")]
    Empty,
    #[error("unclosed generic type '{0}'")]
    Unclosed(String),
    #[error("map type '{0}' must have exactly a key and a value type")]
    MapArity(String),
    #[error("illegal type name '{0}'")]
    IllegalName(String),
}

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Builtin(Builtin),
    Custom(String),
    List(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Parse type text. Custom names are not checked against any registry here.
    pub fn parse(text: &str) -> Result<Self, TypeParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TypeParseError::Empty);
        }

        if let Some(inner) = strip_generic(text, "list")? {
            return Ok(TypeDescriptor::List(Box::new(Self::parse(inner)?)));
        }

        if let Some(inner) = strip_generic(text, "map")? {
            let (key, value) =
                split_top_level(inner).ok_or_else(|| TypeParseError::MapArity(text.to_string()))?;
            return Ok(TypeDescriptor::Map(
                Box::new(Self::parse(key)?),
                Box::new(Self::parse(value)?),
            ));
        }

        if let Some(builtin) = Builtin::from_name(text) {
            return Ok(TypeDescriptor::Builtin(builtin));
        }

        if is_identifier(text) {
            Ok(TypeDescriptor::Custom(text.to_string()))
        } else {
            Err(TypeParseError::IllegalName(text.to_string()))
        }
    }

    /// Every custom type name referenced by this descriptor, leaves first-to-last
    pub fn custom_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_custom(&mut names);
        names
    }

    fn collect_custom<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            TypeDescriptor::Builtin(_) => {}
            TypeDescriptor::Custom(name) => names.push(name),
            TypeDescriptor::List(inner) => inner.collect_custom(names),
            TypeDescriptor::Map(key, value) => {
                key.collect_custom(names);
                value.collect_custom(names);
            }
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, TypeDescriptor::List(_) | TypeDescriptor::Map(..))
    }
}

impl FromStr for TypeDescriptor {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Builtin(b) => write!(f, "{b}"),
            TypeDescriptor::Custom(name) => f.write_str(name),
            TypeDescriptor::List(inner) => write!(f, "list<{inner}>"),
            TypeDescriptor::Map(key, value) => write!(f, "map<{key},{value}>"),
        }
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identifier rule shared by field names, type names, enum values and export
/// names: non-empty, ASCII alphanumeric, first character a letter.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

// `list<...>` / `map<...>` prefixes are matched case-insensitively
fn strip_generic<'a>(text: &'a str, head: &str) -> Result<Option<&'a str>, TypeParseError> {
    let prefix_len = head.len() + 1;
    let matches_head = text
        .get(..prefix_len)
        .is_some_and(|p| p.ends_with('<') && p[..head.len()].eq_ignore_ascii_case(head));
    if !matches_head {
        return Ok(None);
    }
    text[prefix_len..]
        .strip_suffix('>')
        .map(Some)
        .ok_or_else(|| TypeParseError::Unclosed(text.to_string()))
}

// Split `K,V` at the single comma outside any nested angle brackets
fn split_top_level(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut split_at = None;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                if split_at.is_some() {
                    return None;
                }
                split_at = Some(i);
            }
            _ => {}
        }
    }
    split_at.map(|i| (&inner[..i], &inner[i + 1..]))
}
