//! Custom type registry
//!
//! Holds the user-declared enum/struct/class types loaded from a YAML file
//! shaped like:
//!
//! ```yaml
//! Quality:
//!   type: enum
//!   fields: [Common, Rare, Epic]
//! Reward:
//!   type: struct
//!   fields:
//!     item: int
//!     count: int
//!   default: { item: 0, count: 1 }
//! ```
//!
//! Declarations are validated one at a time, in file order, and recorded as
//! soon as they pass. A field may therefore only reference builtins or types
//! declared above it. After loading the registry is read-only and is shared
//! by every later stage.

use crate::coerce::{Coercer, Coercion};
use crate::error::{Error, RegistryError};
use crate::table::RawCell;
use crate::types::{is_identifier, Builtin, TypeDescriptor};
use crate::value::Value;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Kind of a custom type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Enum,
    Struct,
    Class,
}

impl TypeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enum" => Some(TypeKind::Enum),
            "struct" => Some(TypeKind::Struct),
            "class" => Some(TypeKind::Class),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Enum => "enum",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
        }
    }
}

/// A struct/class member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub descriptor: TypeDescriptor,
}

/// Body of a custom type. Struct and class coerce identically; they differ
/// only in the layout downstream generators emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeShape {
    Enum { values: Vec<String> },
    Struct { fields: Vec<FieldDef> },
    Class { fields: Vec<FieldDef> },
}

/// A loaded custom type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(flatten)]
    pub shape: TypeShape,
    /// Resolved explicit `default`, if declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Excluded from generated code
    pub ignore: bool,
}

impl TypeDefinition {
    pub fn kind(&self) -> TypeKind {
        match self.shape {
            TypeShape::Enum { .. } => TypeKind::Enum,
            TypeShape::Struct { .. } => TypeKind::Struct,
            TypeShape::Class { .. } => TypeKind::Class,
        }
    }

    /// Struct/class members; empty for enums
    pub fn fields(&self) -> &[FieldDef] {
        match &self.shape {
            TypeShape::Struct { fields } | TypeShape::Class { fields } => fields,
            TypeShape::Enum { .. } => &[],
        }
    }

    /// Enum values; empty for struct/class
    pub fn enum_values(&self) -> &[String] {
        match &self.shape {
            TypeShape::Enum { values } => values,
            _ => &[],
        }
    }
}

/// Registry of custom types, in declaration order
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDefinition>,
    order: Vec<String>,
}

impl TypeRegistry {
    /// Create an empty registry (builtins only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load declarations from a YAML file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::load_str(&content)?)
    }

    /// Load declarations from YAML text
    pub fn load_str(content: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let document: Yaml = serde_yaml::from_str(content)?;
        match document {
            Yaml::Null => {}
            Yaml::Mapping(declarations) => registry.load(&declarations)?,
            _ => return Err(RegistryError::NotAMapping),
        }
        Ok(registry)
    }

    /// Validate and record each declaration in order, stopping at the first
    /// invalid one
    pub fn load(&mut self, declarations: &Mapping) -> Result<(), RegistryError> {
        for (name, declaration) in declarations {
            let name = yaml_scalar(name).ok_or(RegistryError::NotAMapping)?;
            self.register(&name, declaration)?;
        }
        Ok(())
    }

    /// Validate one declaration and record it
    pub fn register(&mut self, name: &str, declaration: &Yaml) -> Result<(), RegistryError> {
        if !is_identifier(name) || Builtin::from_name(name).is_some() {
            return Err(RegistryError::IllegalTypeName(name.to_string()));
        }
        if self.types.contains_key(name) {
            return Err(RegistryError::DuplicateType(name.to_string()));
        }

        let declaration = declaration
            .as_mapping()
            .ok_or_else(|| RegistryError::Malformed {
                name: name.to_string(),
                message: "definition must be a mapping".to_string(),
            })?;

        let kind_text = declaration
            .get("type")
            .ok_or_else(|| RegistryError::MissingKey {
                name: name.to_string(),
                key: "type",
            })?;
        let kind = kind_text
            .as_str()
            .and_then(TypeKind::parse)
            .ok_or_else(|| RegistryError::UnknownKind {
                name: name.to_string(),
                kind: yaml_scalar(kind_text).unwrap_or_else(|| format!("{kind_text:?}")),
            })?;

        let fields = declaration
            .get("fields")
            .ok_or_else(|| RegistryError::MissingKey {
                name: name.to_string(),
                key: "fields",
            })?;

        let shape = match kind {
            TypeKind::Enum => TypeShape::Enum {
                values: self.validate_enum(name, fields)?,
            },
            TypeKind::Struct => TypeShape::Struct {
                fields: self.validate_composite(name, fields)?,
            },
            TypeKind::Class => TypeShape::Class {
                fields: self.validate_composite(name, fields)?,
            },
        };

        let ignore = match declaration.get("ignore") {
            None | Some(Yaml::Null) => false,
            Some(Yaml::Bool(b)) => *b,
            Some(_) => {
                return Err(RegistryError::Malformed {
                    name: name.to_string(),
                    message: "'ignore' must be a boolean".to_string(),
                })
            }
        };

        self.types.insert(
            name.to_string(),
            TypeDefinition {
                name: name.to_string(),
                shape,
                default: None,
                ignore,
            },
        );
        self.order.push(name.to_string());

        if let Some(spec) = declaration.get("default") {
            match self.resolve_default_spec(name, spec) {
                Ok(value) => {
                    if let Some(def) = self.types.get_mut(name) {
                        def.default = Some(value);
                    }
                }
                Err(e) => {
                    self.types.remove(name);
                    self.order.pop();
                    return Err(e);
                }
            }
        }

        debug!(name, kind = kind.as_str(), "registered custom type");
        Ok(())
    }

    fn validate_enum(&self, name: &str, fields: &Yaml) -> Result<Vec<String>, RegistryError> {
        let items = fields.as_sequence().ok_or_else(|| RegistryError::Malformed {
            name: name.to_string(),
            message: "enum 'fields' must be a list of values".to_string(),
        })?;
        if items.is_empty() {
            return Err(RegistryError::EmptyEnum(name.to_string()));
        }

        let values: Vec<String> = items
            .iter()
            .map(|v| yaml_scalar(v).unwrap_or_else(|| format!("{v:?}")))
            .collect();

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for value in &values {
            if !seen.insert(value.as_str()) && !duplicates.contains(value) {
                duplicates.push(value.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(RegistryError::DuplicateEnumValues {
                name: name.to_string(),
                duplicates,
            });
        }

        if let Some(bad) = values.iter().find(|v| !is_identifier(v)) {
            return Err(RegistryError::IllegalFieldName {
                name: name.to_string(),
                field: bad.clone(),
            });
        }
        Ok(values)
    }

    fn validate_composite(&self, name: &str, fields: &Yaml) -> Result<Vec<FieldDef>, RegistryError> {
        let members = fields.as_mapping().ok_or_else(|| RegistryError::Malformed {
            name: name.to_string(),
            message: "'fields' must map field names to types".to_string(),
        })?;

        let mut defs = Vec::with_capacity(members.len());
        for (field, ty) in members {
            let field = yaml_scalar(field).unwrap_or_else(|| format!("{field:?}"));
            if !is_identifier(&field) {
                return Err(RegistryError::IllegalFieldName {
                    name: name.to_string(),
                    field,
                });
            }
            let ty_text = yaml_scalar(ty).unwrap_or_default();
            let descriptor = TypeDescriptor::parse(&ty_text)
                .ok()
                .filter(|d| self.is_valid_descriptor(d))
                .ok_or_else(|| RegistryError::UndefinedFieldType {
                    name: name.to_string(),
                    field: field.clone(),
                    ty: ty_text.clone(),
                })?;
            defs.push(FieldDef {
                name: field,
                descriptor,
            });
        }
        Ok(defs)
    }

    // Check an explicit `default` against the type it belongs to and coerce it
    fn resolve_default_spec(&self, name: &str, spec: &Yaml) -> Result<Value, RegistryError> {
        let invalid = |message: String| RegistryError::InvalidDefault {
            name: name.to_string(),
            message,
        };
        let def = self
            .types
            .get(name)
            .ok_or_else(|| invalid("type is not registered".to_string()))?;

        match &def.shape {
            TypeShape::Enum { values } => {
                let value = yaml_scalar(spec).unwrap_or_default();
                if values.contains(&value) {
                    Ok(Value::Enum(value))
                } else {
                    Err(invalid(format!("'{value}' is not one of the enum values")))
                }
            }
            TypeShape::Struct { fields } | TypeShape::Class { fields } => {
                let provided = spec
                    .as_mapping()
                    .ok_or_else(|| invalid("default must be a mapping of field values".to_string()))?;
                let provided: Vec<(String, &Yaml)> = provided
                    .iter()
                    .map(|(k, v)| (yaml_scalar(k).unwrap_or_default(), v))
                    .collect();

                let missing: Vec<&str> = fields
                    .iter()
                    .filter(|f| !provided.iter().any(|(k, _)| *k == f.name))
                    .map(|f| f.name.as_str())
                    .collect();
                if !missing.is_empty() {
                    return Err(invalid(format!("missing fields: {}", missing.join(", "))));
                }
                let extra: Vec<&str> = provided
                    .iter()
                    .filter(|(k, _)| !fields.iter().any(|f| f.name == *k))
                    .map(|(k, _)| k.as_str())
                    .collect();
                if !extra.is_empty() {
                    return Err(invalid(format!("unknown fields: {}", extra.join(", "))));
                }

                let coercer = Coercer::new(self);
                let mut record = Vec::with_capacity(fields.len());
                for field in fields {
                    let raw = provided
                        .iter()
                        .find(|(k, _)| *k == field.name)
                        .map(|(_, v)| yaml_to_cell(v))
                        .transpose()
                        .map_err(|e| invalid(e.to_string()))?
                        .unwrap_or(RawCell::Empty);
                    let value = coercer
                        .coerce(&raw, Coercion::field(&field.descriptor))
                        .map_err(|e| invalid(e.in_field(&field.name).to_string()))?;
                    record.push((field.name.clone(), value));
                }
                Ok(Value::Record(record))
            }
        }
    }

    /// Look up a custom type
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Whether type text parses and every leaf is a builtin or a known type
    pub fn is_valid_type(&self, text: &str) -> bool {
        TypeDescriptor::parse(text).is_ok_and(|d| self.is_valid_descriptor(&d))
    }

    pub fn is_valid_descriptor(&self, descriptor: &TypeDescriptor) -> bool {
        match descriptor {
            TypeDescriptor::Builtin(_) => true,
            TypeDescriptor::Custom(name) => self.contains(name),
            TypeDescriptor::List(inner) => self.is_valid_descriptor(inner),
            TypeDescriptor::Map(key, value) => {
                self.is_valid_descriptor(key) && self.is_valid_descriptor(value)
            }
        }
    }

    /// Default value of a type; `None` only for unknown custom names
    pub fn default_value(&self, descriptor: &TypeDescriptor) -> Option<Value> {
        match descriptor {
            TypeDescriptor::List(_) => Some(Value::List(Vec::new())),
            TypeDescriptor::Map(..) => Some(Value::Map(Vec::new())),
            TypeDescriptor::Builtin(b) => Some(Value::zero(*b)),
            TypeDescriptor::Custom(name) => {
                let def = self.get(name)?;
                if let Some(value) = &def.default {
                    return Some(value.clone());
                }
                match &def.shape {
                    TypeShape::Enum { values } => values.first().cloned().map(Value::Enum),
                    TypeShape::Struct { fields } => fields
                        .iter()
                        .map(|f| self.default_value(&f.descriptor).map(|v| (f.name.clone(), v)))
                        .collect::<Option<Vec<_>>>()
                        .map(Value::Record),
                    TypeShape::Class { .. } => Some(Value::Record(Vec::new())),
                }
            }
        }
    }

    /// Definitions in declaration order
    pub fn definitions(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Serialize for TypeRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for def in self.definitions() {
            seq.serialize_element(def)?;
        }
        seq.end()
    }
}

fn yaml_scalar(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_to_cell(value: &Yaml) -> Result<RawCell, serde_json::Error> {
    serde_json::to_value(value).map(|json| RawCell::from_json(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Builtin;

    const TYPES: &str = r#"
Quality:
  type: enum
  fields: [Common, Rare, Epic]
Reward:
  type: struct
  fields:
    item: int
    count: int
    quality: Quality
Bag:
  type: class
  fields:
    rewards: list<Reward>
Tint:
  type: enum
  fields: [Red, Blue]
  default: Blue
Slot:
  type: struct
  fields:
    size: int
    tint: Tint
  default: { size: 4, tint: Red }
  ignore: true
"#;

    fn registry() -> TypeRegistry {
        TypeRegistry::load_str(TYPES).unwrap()
    }

    #[test]
    fn test_load_in_declaration_order() {
        let reg = registry();
        let names: Vec<_> = reg.definitions().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Quality", "Reward", "Bag", "Tint", "Slot"]);
        assert_eq!(reg.get("Reward").unwrap().kind(), TypeKind::Struct);
        assert_eq!(reg.get("Bag").unwrap().kind(), TypeKind::Class);
        assert!(reg.get("Slot").unwrap().ignore);
    }

    #[test]
    fn test_is_valid_type() {
        let reg = registry();
        assert!(reg.is_valid_type("int"));
        assert!(reg.is_valid_type("list<Reward>"));
        assert!(reg.is_valid_type("map<string,list<Quality>>"));
        assert!(!reg.is_valid_type("Missing"));
        assert!(!reg.is_valid_type("list<Missing>"));
        assert!(!reg.is_valid_type("map<int,Missing>"));
        assert!(!reg.is_valid_type("list<int"));
    }

    #[test]
    fn test_forward_reference_is_undefined() {
        let err = TypeRegistry::load_str(
            "A:\n  type: struct\n  fields:\n    b: B\nB:\n  type: enum\n  fields: [X]\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UndefinedFieldType { ref name, ref ty, .. } if name == "A" && ty == "B"
        ));
    }

    #[test]
    fn test_missing_kind_and_fields() {
        let err = TypeRegistry::load_str("A:\n  fields: [X]\n").unwrap_err();
        assert!(matches!(err, RegistryError::MissingKey { key: "type", .. }));

        let err = TypeRegistry::load_str("A:\n  type: enum\n").unwrap_err();
        assert!(matches!(err, RegistryError::MissingKey { key: "fields", .. }));

        let err = TypeRegistry::load_str("A:\n  type: union\n  fields: [X]\n").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKind { .. }));
    }

    #[test]
    fn test_enum_validation() {
        let err = TypeRegistry::load_str("A:\n  type: enum\n  fields: []\n").unwrap_err();
        assert!(matches!(err, RegistryError::EmptyEnum(_)));

        let err = TypeRegistry::load_str("A:\n  type: enum\n  fields: [X, Y, X, Y, X]\n")
            .unwrap_err();
        match err {
            RegistryError::DuplicateEnumValues { duplicates, .. } => {
                assert_eq!(duplicates, vec!["X", "Y"])
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = TypeRegistry::load_str("A:\n  type: enum\n  fields: [ok, not_ok]\n").unwrap_err();
        assert!(matches!(err, RegistryError::IllegalFieldName { .. }));
    }

    #[test]
    fn test_illegal_struct_field_name() {
        let err = TypeRegistry::load_str("A:\n  type: struct\n  fields:\n    1x: int\n").unwrap_err();
        assert!(matches!(err, RegistryError::IllegalFieldName { .. }));
    }

    #[test]
    fn test_builtin_defaults() {
        let reg = TypeRegistry::new();
        let ty = |s: &str| TypeDescriptor::parse(s).unwrap();
        assert_eq!(reg.default_value(&ty("int")), Some(Value::Int(0)));
        assert_eq!(reg.default_value(&ty("uint")), Some(Value::UInt(0)));
        assert_eq!(reg.default_value(&ty("string")), Some(Value::String(String::new())));
        assert_eq!(reg.default_value(&ty("bool")), Some(Value::Bool(false)));
        assert_eq!(reg.default_value(&ty("datetime")), Some(Value::DateTime(0)));
        assert_eq!(reg.default_value(&ty("list<int>")), Some(Value::List(vec![])));
        assert_eq!(reg.default_value(&ty("map<int,int>")), Some(Value::Map(vec![])));
        assert_eq!(reg.default_value(&ty("Unknown")), None);
        assert_eq!(
            reg.default_value(&TypeDescriptor::Builtin(Builtin::Char)),
            Some(Value::Char('\0'))
        );
    }

    #[test]
    fn test_custom_defaults() {
        let reg = registry();
        let ty = |s: &str| TypeDescriptor::parse(s).unwrap();

        assert_eq!(
            reg.default_value(&ty("Quality")),
            Some(Value::Enum("Common".into()))
        );
        assert_eq!(reg.default_value(&ty("Tint")), Some(Value::Enum("Blue".into())));
        assert_eq!(
            reg.default_value(&ty("Reward")),
            Some(Value::Record(vec![
                ("item".into(), Value::Int(0)),
                ("count".into(), Value::Int(0)),
                ("quality".into(), Value::Enum("Common".into())),
            ]))
        );
        assert_eq!(reg.default_value(&ty("Bag")), Some(Value::Record(vec![])));
        assert_eq!(
            reg.default_value(&ty("Slot")),
            Some(Value::Record(vec![
                ("size".into(), Value::Int(4)),
                ("tint".into(), Value::Enum("Red".into())),
            ]))
        );
    }

    #[test]
    fn test_invalid_defaults() {
        let err = TypeRegistry::load_str("A:\n  type: enum\n  fields: [X]\n  default: Y\n")
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefault { .. }));

        let err = TypeRegistry::load_str(
            "A:\n  type: struct\n  fields:\n    a: int\n    b: int\n  default: { a: 1 }\n",
        )
        .unwrap_err();
        match err {
            RegistryError::InvalidDefault { message, .. } => assert!(message.contains("b")),
            other => panic!("unexpected error: {other}"),
        }

        let err = TypeRegistry::load_str(
            "A:\n  type: struct\n  fields:\n    a: byte\n  default: { a: 300 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefault { .. }));
    }

    #[test]
    fn test_empty_document_is_empty_registry() {
        assert!(TypeRegistry::load_str("").unwrap().is_empty());
        assert!(matches!(
            TypeRegistry::load_str("- a\n- b\n"),
            Err(RegistryError::NotAMapping)
        ));
    }
}
