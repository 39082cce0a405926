//! Value coercion: raw cell + type descriptor + tags -> canonical [`Value`]
//!
//! Recursion carries an explicit [`Coercion`] context. Container elements
//! keep the parent's tags ([`Coercion::element`]); struct/class fields start
//! from an empty tag set ([`Coercion::field`]).

use crate::datetime::{cast_datetime, DEFAULT_DATE_FORMAT};
use crate::error::{CastError, StructCastError};
use crate::literal;
use crate::numeric::{cast_integer, cast_real};
use crate::registry::{FieldDef, TypeRegistry, TypeShape};
use crate::table::{FieldMeta, RawCell};
use crate::tags::{self, Tags};
use crate::types::{Builtin, TypeDescriptor};
use crate::value::Value;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static DEFAULT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[|]").expect("default separator is valid"));

/// What a value is being coerced to, and which tags apply
#[derive(Debug, Clone, Copy)]
pub struct Coercion<'a> {
    pub descriptor: &'a TypeDescriptor,
    pub tags: &'a Tags,
}

impl<'a> Coercion<'a> {
    pub fn new(descriptor: &'a TypeDescriptor, tags: &'a Tags) -> Self {
        Self { descriptor, tags }
    }

    /// Context for a list element or map key/value: the parent's tags apply
    pub fn element(&self, descriptor: &'a TypeDescriptor) -> Self {
        Self {
            descriptor,
            tags: self.tags,
        }
    }

    /// Context for a struct/class member: no tags apply
    pub fn field(descriptor: &'a TypeDescriptor) -> Self {
        Self {
            descriptor,
            tags: Tags::none(),
        }
    }
}

/// Coerces raw cells against the loaded type registry
#[derive(Debug, Clone, Copy)]
pub struct Coercer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Coercer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Coerce one data cell of a sheet column
    pub fn coerce_field(&self, field: &FieldMeta, cell: &RawCell) -> Result<Value, CastError> {
        self.coerce(cell, Coercion::new(&field.descriptor, &field.tags))
    }

    /// Coerce a cell, resolving blanks through the default precedence
    pub fn coerce(&self, cell: &RawCell, ctx: Coercion<'_>) -> Result<Value, CastError> {
        if cell.is_blank() {
            self.resolve_default(ctx)
        } else {
            self.cast(cell, ctx)
        }
    }

    /// Default for a blank cell: a `Default:` tag, then the registry's
    /// default for the type, then an inferred empty value
    pub fn resolve_default(&self, ctx: Coercion<'_>) -> Result<Value, CastError> {
        if let Some(literal) = ctx.tags.value(tags::DEFAULT).map(str::trim) {
            if !literal.is_empty() {
                return self.cast(&RawCell::Text(literal.to_string()), ctx);
            }
        }
        self.type_default(ctx.descriptor)
    }

    fn type_default(&self, descriptor: &TypeDescriptor) -> Result<Value, CastError> {
        self.registry
            .default_value(descriptor)
            .or_else(|| infer_default(descriptor))
            .ok_or_else(|| {
                CastError::cast(&RawCell::Empty, descriptor.to_string(), "type has no default")
            })
    }

    /// Cast a non-blank cell
    pub fn cast(&self, cell: &RawCell, ctx: Coercion<'_>) -> Result<Value, CastError> {
        let trimmed;
        let cell = match cell {
            RawCell::Text(s) if s.trim().len() != s.len() => {
                trimmed = RawCell::Text(s.trim().to_string());
                &trimmed
            }
            _ => cell,
        };

        match ctx.descriptor {
            TypeDescriptor::Builtin(builtin) => self.cast_builtin(cell, *builtin, ctx.tags),
            TypeDescriptor::List(inner) => self.cast_list(cell, ctx, inner),
            TypeDescriptor::Map(key, value) => self.cast_map(cell, ctx, key, value),
            TypeDescriptor::Custom(name) => self.cast_custom(cell, name),
        }
    }

    fn cast_builtin(&self, cell: &RawCell, builtin: Builtin, tags: &Tags) -> Result<Value, CastError> {
        match builtin {
            Builtin::Int
            | Builtin::Long
            | Builtin::Byte
            | Builtin::SByte
            | Builtin::Short
            | Builtin::UInt
            | Builtin::ULong
            | Builtin::UShort => cast_integer(cell, builtin),
            Builtin::Float | Builtin::Double | Builtin::Decimal => cast_real(cell, builtin),
            Builtin::Bool => cast_bool(cell),
            Builtin::DateTime => {
                let template = tags.value(tags::DATE_FORMAT).unwrap_or(DEFAULT_DATE_FORMAT);
                cast_datetime(cell, template)
            }
            Builtin::Char => cast_char(cell),
            Builtin::String => Ok(Value::String(cell.to_string_value())),
        }
    }

    fn cast_list<'a>(
        &self,
        cell: &RawCell,
        ctx: Coercion<'a>,
        inner: &'a TypeDescriptor,
    ) -> Result<Value, CastError> {
        let separator = match ctx.tags.value(tags::LIST_SEPARATOR).filter(|p| !p.is_empty()) {
            Some(pattern) => Cow::Owned(
                Regex::new(&format!("[{pattern}]"))
                    .map_err(|e| CastError::cast(cell, ctx.descriptor.to_string(), e.to_string()))?,
            ),
            None => Cow::Borrowed(&*DEFAULT_SEPARATOR),
        };

        let text = cell.to_string_value();
        separator
            .split(&text)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| self.cast(&RawCell::Text(token.to_string()), ctx.element(inner)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn cast_map<'a>(
        &self,
        cell: &RawCell,
        ctx: Coercion<'a>,
        key_type: &'a TypeDescriptor,
        value_type: &'a TypeDescriptor,
    ) -> Result<Value, CastError> {
        let separator = match ctx.tags.value(tags::MAP_SEPARATOR).filter(|c| !c.is_empty()) {
            Some(chars) => Cow::Owned(
                Regex::new(&format!("[{}]", regex::escape(chars)))
                    .map_err(|e| CastError::cast(cell, ctx.descriptor.to_string(), e.to_string()))?,
            ),
            None => Cow::Borrowed(&*DEFAULT_SEPARATOR),
        };

        let text = cell.to_string_value();
        let mut entries = Vec::new();
        for pair in separator.split(&text).map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once(':').ok_or_else(|| {
                CastError::cast(
                    cell,
                    ctx.descriptor.to_string(),
                    format!("entry '{pair}' is not a key:value pair"),
                )
            })?;
            let key = self.cast_entry_part(key, ctx.element(key_type))?;
            let value = self.cast_entry_part(value, ctx.element(value_type))?;
            Value::insert_entry(&mut entries, key, value);
        }
        Ok(Value::Map(entries))
    }

    // A blank key or value takes its type's default, never the field's tag
    fn cast_entry_part(&self, text: &str, ctx: Coercion<'_>) -> Result<Value, CastError> {
        let cell = RawCell::from_text(text);
        if cell.is_blank() {
            self.type_default(ctx.descriptor)
        } else {
            self.cast(&cell, ctx)
        }
    }

    fn cast_custom(&self, cell: &RawCell, name: &str) -> Result<Value, CastError> {
        let def = self
            .registry
            .get(name)
            .ok_or_else(|| CastError::cast(cell, name, "undefined type"))?;

        match &def.shape {
            TypeShape::Enum { values } => {
                let text = cell.to_string_value();
                if values.contains(&text) {
                    Ok(Value::Enum(text))
                } else {
                    Err(CastError::cast(
                        cell,
                        name,
                        format!("expected one of: {}", values.join(", ")),
                    ))
                }
            }
            TypeShape::Struct { fields } | TypeShape::Class { fields } => {
                self.cast_record(cell, name, fields)
            }
        }
    }

    fn cast_record(&self, cell: &RawCell, name: &str, fields: &[FieldDef]) -> Result<Value, CastError> {
        let original = cell.to_string_value();
        let provided = literal::parse_object(name, &original)?;

        let missing: Vec<String> = fields
            .iter()
            .filter(|f| !provided.contains_key(&f.name))
            .map(|f| f.name.clone())
            .collect();
        let extra: Vec<String> = provided
            .keys()
            .filter(|k| !fields.iter().any(|f| &f.name == *k))
            .cloned()
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(StructCastError::mismatch(name, &original, missing, extra).into());
        }

        fields
            .iter()
            .map(|field| {
                let raw = provided
                    .get(&field.name)
                    .map(RawCell::from_json)
                    .unwrap_or(RawCell::Empty);
                self.coerce(&raw, Coercion::field(&field.descriptor))
                    .map(|value| (field.name.clone(), value))
                    .map_err(|e| e.in_field(&field.name))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Record)
    }
}

/// Last-resort default for descriptors the registry has nothing for
fn infer_default(descriptor: &TypeDescriptor) -> Option<Value> {
    match descriptor {
        TypeDescriptor::List(_) => Some(Value::List(Vec::new())),
        TypeDescriptor::Map(..) => Some(Value::Map(Vec::new())),
        TypeDescriptor::Builtin(Builtin::DateTime) => Some(Value::DateTime(0)),
        _ => None,
    }
}

fn cast_bool(cell: &RawCell) -> Result<Value, CastError> {
    if let RawCell::Bool(b) = cell {
        return Ok(Value::Bool(*b));
    }
    match cell.to_string_value().trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
        "false" | "0" | "no" | "n" => Ok(Value::Bool(false)),
        _ => Err(CastError::cast(cell, "bool", "expected true/false, 1/0, yes/no or y/n")),
    }
}

fn cast_char(cell: &RawCell) -> Result<Value, CastError> {
    let text = cell.to_string_value();
    let mut chars = text.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Char(c)),
        _ => Err(CastError::cast(cell, "char", "expected exactly one character")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DecimalValue;
    use chrono::{Local, TimeZone};

    const TYPES: &str = r#"
Quality:
  type: enum
  fields: [Common, Rare]
Pair:
  type: struct
  fields:
    a: int
    b: string
Stamp:
  type: struct
  fields:
    at: datetime
    tags: list<int>
Outer:
  type: class
  fields:
    inner: Pair
    quality: Quality
"#;

    fn registry() -> TypeRegistry {
        TypeRegistry::load_str(TYPES).unwrap()
    }

    fn ty(s: &str) -> TypeDescriptor {
        TypeDescriptor::parse(s).unwrap()
    }

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn coerce(reg: &TypeRegistry, ty_text: &str, tag_text: &str, cell: RawCell) -> Result<Value, CastError> {
        let descriptor = ty(ty_text);
        let tags = Tags::parse(tag_text);
        Coercer::new(reg).coerce(&cell, Coercion::new(&descriptor, &tags))
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_list_default_separator() {
        let reg = TypeRegistry::new();
        assert_eq!(coerce(&reg, "list<int>", "", text("1|2|3")), Ok(ints(&[1, 2, 3])));
        assert_eq!(coerce(&reg, "list<int>", "", text(" 1 || 2 |")), Ok(ints(&[1, 2])));
    }

    #[test]
    fn test_list_custom_separator() {
        let reg = TypeRegistry::new();
        assert_eq!(
            coerce(&reg, "list<int>", "ListSeparator:,", text("1,2,3")),
            Ok(ints(&[1, 2, 3]))
        );
        assert_eq!(
            coerce(&reg, "list<int>", "ListSeparator:,|", text("1,2|3")),
            Ok(ints(&[1, 2, 3]))
        );
    }

    #[test]
    fn test_list_element_errors_surface() {
        let reg = TypeRegistry::new();
        assert!(matches!(
            coerce(&reg, "list<byte>", "", text("1|300")),
            Err(CastError::Overflow { .. })
        ));
    }

    #[test]
    fn test_nested_list_in_map() {
        let reg = TypeRegistry::new();
        let v = coerce(&reg, "map<string,list<int>>", "ListSeparator:,", text("a:1,2|b:3")).unwrap();
        assert_eq!(
            v,
            Value::Map(vec![
                (Value::String("a".into()), ints(&[1, 2])),
                (Value::String("b".into()), ints(&[3])),
            ])
        );
    }

    #[test]
    fn test_map_later_keys_overwrite() {
        let reg = TypeRegistry::new();
        let v = coerce(&reg, "map<int,string>", "", text("1:a|2:b|1:c")).unwrap();
        assert_eq!(
            v,
            Value::Map(vec![
                (Value::Int(1), Value::String("c".into())),
                (Value::Int(2), Value::String("b".into())),
            ])
        );
    }

    #[test]
    fn test_map_value_splits_on_first_colon() {
        let reg = TypeRegistry::new();
        let v = coerce(&reg, "map<string,string>", "MapSeparator:,", text("url:http://x,k:v")).unwrap();
        assert_eq!(
            v,
            Value::Map(vec![
                (Value::String("url".into()), Value::String("http://x".into())),
                (Value::String("k".into()), Value::String("v".into())),
            ])
        );
    }

    #[test]
    fn test_map_entry_without_colon_fails() {
        let reg = TypeRegistry::new();
        assert!(coerce(&reg, "map<int,int>", "", text("1:2|3")).is_err());
    }

    #[test]
    fn test_map_blank_value_uses_type_default() {
        let reg = TypeRegistry::new();
        let v = coerce(&reg, "map<int,int>", "Default:9", text("1:")).unwrap();
        assert_eq!(v, Value::Map(vec![(Value::Int(1), Value::Int(0))]));
    }

    #[test]
    fn test_container_elements_inherit_tags() {
        let reg = TypeRegistry::new();
        let v = coerce(&reg, "list<datetime>", "DateFormat:%Y-%m-%d", text("2024-3-5|2024-03-06")).unwrap();
        let day = |d| Local.with_ymd_and_hms(2024, 3, d, 0, 0, 0).earliest().unwrap().timestamp();
        assert_eq!(v, Value::List(vec![Value::DateTime(day(5)), Value::DateTime(day(6))]));

        let v = coerce(&reg, "map<int,datetime>", "DateFormat:%Y-%m-%d", text("1:2024-3-5")).unwrap();
        assert_eq!(v, Value::Map(vec![(Value::Int(1), Value::DateTime(day(5)))]));
    }

    #[test]
    fn test_struct_fields_do_not_inherit_tags() {
        let reg = registry();
        // the field's DateFormat must not reach the nested datetime member
        let err = coerce(
            &reg,
            "Stamp",
            "DateFormat:%Y-%m-%d;ListSeparator:,",
            text(r#"{at: "2024-03-05", tags: "1|2"}"#),
        )
        .unwrap_err();
        assert_eq!(err.field_path(), vec!["at"]);

        let v = coerce(
            &reg,
            "Stamp",
            "DateFormat:%Y-%m-%d;ListSeparator:,",
            text(r#"{at: "2024/03/05 00:00:00", tags: "1|2"}"#),
        )
        .unwrap();
        assert_eq!(v.field("tags"), Some(&ints(&[1, 2])));
    }

    #[test]
    fn test_struct_relaxed_literal() {
        let reg = registry();
        assert_eq!(
            coerce(&reg, "Pair", "", text("{a:1,b:hello}")),
            Ok(Value::Record(vec![
                ("a".into(), Value::Int(1)),
                ("b".into(), Value::String("hello".into())),
            ]))
        );
    }

    #[test]
    fn test_struct_string_member_with_colons() {
        let reg = registry();
        assert_eq!(
            coerce(&reg, "Pair", "", text(r#"{"a": 1, "b": "Note:foo, bar"}"#)),
            Ok(Value::Record(vec![
                ("a".into(), Value::Int(1)),
                ("b".into(), Value::String("Note:foo, bar".into())),
            ]))
        );
        assert_eq!(
            coerce(&reg, "Pair", "", text(r#"{a: 2, b: "tier:gold}"}"#))
                .ok()
                .and_then(|v| v.field("b").cloned()),
            Some(Value::String("tier:gold}".into()))
        );
    }

    #[test]
    fn test_struct_missing_and_extra_fields() {
        let reg = registry();
        match coerce(&reg, "Pair", "", text("{a:1}")) {
            Err(CastError::Struct(e)) => {
                assert_eq!(e.missing, vec!["b"]);
                assert!(e.extra.is_empty());
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match coerce(&reg, "Pair", "", text("{a:1,b:hi,c:1}")) {
            Err(CastError::Struct(e)) => {
                assert!(e.missing.is_empty());
                assert_eq!(e.extra, vec!["c"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_struct_malformed_literal() {
        let reg = registry();
        match coerce(&reg, "Pair", "", text("{a:1,b:")) {
            Err(CastError::Struct(e)) => {
                assert_eq!(e.original, "{a:1,b:");
                assert!(e.position.is_some());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_nested_struct_error_path() {
        let reg = registry();
        let err = coerce(
            &reg,
            "Outer",
            "",
            text("{inner: {a: x, b: y}, quality: Rare}"),
        )
        .unwrap_err();
        assert_eq!(err.field_path(), vec!["inner", "a"]);
        assert!(matches!(err.root_cause(), CastError::Cast { target, .. } if target == "int"));
    }

    #[test]
    fn test_nested_struct_value() {
        let reg = registry();
        let v = coerce(&reg, "Outer", "", text("{inner: {a: 2, b: x}, quality: Rare}")).unwrap();
        assert_eq!(
            v.field("inner").and_then(|i| i.field("a")),
            Some(&Value::Int(2))
        );
        assert_eq!(v.field("quality"), Some(&Value::Enum("Rare".into())));
    }

    #[test]
    fn test_struct_null_member_uses_default() {
        let reg = registry();
        let v = coerce(&reg, "Pair", "", text("{a: null, b: NULL}")).unwrap();
        assert_eq!(
            v,
            Value::Record(vec![
                ("a".into(), Value::Int(0)),
                ("b".into(), Value::String(String::new())),
            ])
        );
    }

    #[test]
    fn test_enum_exact_match() {
        let reg = registry();
        assert_eq!(
            coerce(&reg, "Quality", "", text("Rare")),
            Ok(Value::Enum("Rare".into()))
        );
        assert!(coerce(&reg, "Quality", "", text("rare")).is_err());
    }

    #[test]
    fn test_default_precedence() {
        let reg = registry();
        assert_eq!(coerce(&reg, "int", "Default:7", RawCell::Empty), Ok(Value::Int(7)));
        assert_eq!(coerce(&reg, "int", "Default:  ", RawCell::Empty), Ok(Value::Int(0)));
        assert_eq!(coerce(&reg, "int", "", text("   ")), Ok(Value::Int(0)));
        assert_eq!(
            coerce(&reg, "Quality", "", RawCell::Empty),
            Ok(Value::Enum("Common".into()))
        );
        assert_eq!(
            coerce(&reg, "list<int>", "Default:4|5", RawCell::Empty),
            Ok(ints(&[4, 5]))
        );
        assert!(coerce(&reg, "byte", "Default:999", RawCell::Empty).is_err());
    }

    #[test]
    fn test_scalars() {
        let reg = TypeRegistry::new();
        assert_eq!(coerce(&reg, "bool", "", text("Yes")), Ok(Value::Bool(true)));
        assert_eq!(coerce(&reg, "bool", "", text("n")), Ok(Value::Bool(false)));
        assert_eq!(coerce(&reg, "bool", "", RawCell::Number(1.0)), Ok(Value::Bool(true)));
        assert_eq!(coerce(&reg, "bool", "", RawCell::Bool(false)), Ok(Value::Bool(false)));
        assert!(coerce(&reg, "bool", "", text("maybe")).is_err());

        assert_eq!(coerce(&reg, "char", "", text("x")), Ok(Value::Char('x')));
        assert!(coerce(&reg, "char", "", text("xy")).is_err());

        assert_eq!(
            coerce(&reg, "string", "", text("  hi there ")),
            Ok(Value::String("hi there".into()))
        );
        assert_eq!(
            coerce(&reg, "string", "", RawCell::Number(3.0)),
            Ok(Value::String("3".into()))
        );
        assert_eq!(
            coerce(&reg, "decimal", "", text("NaN")),
            Ok(Value::Decimal(DecimalValue::NaN))
        );
    }

    #[test]
    fn test_cast_error_reports_kind_and_target() {
        let reg = TypeRegistry::new();
        match coerce(&reg, "int", "", text("abc")) {
            Err(CastError::Cast { value, kind, target, .. }) => {
                assert_eq!(value, "abc");
                assert_eq!(kind, "text");
                assert_eq!(target, "int");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
