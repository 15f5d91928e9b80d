//! Entity descriptors
//!
//! An [`EntityDescriptor`] is the declarative schema for one datatype: an
//! ordered list of [`FieldSpec`]s, each with a semantic [`FieldKind`], an
//! optional default, nullability, and optional accessor and validation hooks.
//! Descriptors are built once from the static catalog and never mutated.
//!
//! A field without a default is required: mapping fails when it is absent or
//! null.

use crate::domain::ids::DatatypeName;
use crate::domain::record::MappedRecord;
use crate::domain::row::SourceRow;
use crate::domain::{QuarryError, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Custom per-field accessor, called instead of a direct column lookup
pub type FieldAccessor = fn(&SourceRow) -> Option<Value>;

/// Extra validation applied to a cleaned value
pub type FieldRule = fn(&Value) -> std::result::Result<(), String>;

/// Per-record pre-export hook, run after every field is cleaned
pub type RecordHook = fn(&mut MappedRecord) -> std::result::Result<(), String>;

/// Semantic type of a field, driving both validation and cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Plain text, HTML tags stripped
    Text,
    /// Raw text or HTML, kept as-is apart from control characters
    Raw,
    /// Boolean, exported as integer 0/1
    Bool,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Raw => "raw",
            FieldKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldKind {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Int),
            "float" | "number" => Ok(Self::Float),
            "text" => Ok(Self::Text),
            "raw" | "html" => Ok(Self::Raw),
            "bool" | "boolean" => Ok(Self::Bool),
            _ => Err(QuarryError::Schema(format!(
                "Unknown field type '{s}'. Expected int, float, text, raw or bool"
            ))),
        }
    }
}

/// One field of an entity descriptor
#[derive(Clone)]
pub struct FieldSpec {
    /// Output field name, also the default source column
    pub name: String,
    /// Semantic type
    pub kind: FieldKind,
    /// Default applied when the value is absent; `None` means required
    pub default: Option<Value>,
    /// Whether an explicit null is kept as null
    pub nullable: bool,
    /// Custom accessor, called instead of a direct lookup
    pub accessor: Option<FieldAccessor>,
    /// Extra validation rule
    pub rule: Option<FieldRule>,
}

impl FieldSpec {
    /// A required field of the given kind
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            nullable: false,
            accessor: None,
            rule: None,
        }
    }

    /// A field that falls back to `default` when absent or null
    pub fn optional(name: impl Into<String>, kind: FieldKind, default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            ..Self::required(name, kind)
        }
    }

    /// A nullable field defaulting to null
    pub fn nullable(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            default: Some(Value::Null),
            nullable: true,
            ..Self::required(name, kind)
        }
    }

    /// Attach a custom accessor
    pub fn with_accessor(mut self, accessor: FieldAccessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Attach a validation rule
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Whether the field has no default
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("nullable", &self.nullable)
            .field("accessor", &self.accessor.is_some())
            .field("rule", &self.rule.is_some())
            .finish()
    }
}

/// Declarative schema for one datatype
#[derive(Clone)]
pub struct EntityDescriptor {
    name: DatatypeName,
    fields: Vec<FieldSpec>,
    hook: Option<RecordHook>,
}

impl EntityDescriptor {
    /// Build a descriptor, rejecting empty or duplicate field names
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Schema`] when the field list is empty or
    /// contains an empty or repeated name.
    pub fn new(name: DatatypeName, fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(QuarryError::Schema(format!(
                "Descriptor for '{name}' declares no fields"
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(QuarryError::Schema(format!(
                    "Descriptor for '{name}' has a field with an empty name"
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(QuarryError::Schema(format!(
                    "Descriptor for '{name}' declares field '{}' twice",
                    field.name
                )));
            }
        }

        Ok(Self {
            name,
            fields,
            hook: None,
        })
    }

    /// Attach a per-record hook
    pub fn with_hook(mut self, hook: RecordHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Per-record hook, if any
    pub fn hook(&self) -> Option<RecordHook> {
        self.hook
    }

    /// Datatype name
    pub fn name(&self) -> &DatatypeName {
        &self.name
    }

    /// Fields in output order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required fields
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name() -> DatatypeName {
        DatatypeName::new("users").unwrap()
    }

    #[test]
    fn test_field_constructors() {
        let id = FieldSpec::required("id", FieldKind::Int);
        assert!(id.is_required());
        assert!(!id.nullable);

        let email = FieldSpec::optional("email", FieldKind::Text, "");
        assert_eq!(email.default, Some(json!("")));
        assert!(!email.is_required());

        let summary = FieldSpec::nullable("summary", FieldKind::Raw);
        assert_eq!(summary.default, Some(Value::Null));
        assert!(summary.nullable);
    }

    #[test]
    fn test_descriptor_rejects_duplicates() {
        let result = EntityDescriptor::new(
            name(),
            vec![
                FieldSpec::required("id", FieldKind::Int),
                FieldSpec::required("id", FieldKind::Int),
            ],
        );
        assert!(matches!(result, Err(QuarryError::Schema(_))));
    }

    #[test]
    fn test_descriptor_rejects_empty() {
        assert!(EntityDescriptor::new(name(), vec![]).is_err());
        assert!(
            EntityDescriptor::new(name(), vec![FieldSpec::required(" ", FieldKind::Int)]).is_err()
        );
    }

    #[test]
    fn test_required_fields() {
        let descriptor = EntityDescriptor::new(
            name(),
            vec![
                FieldSpec::required("id", FieldKind::Int),
                FieldSpec::optional("email", FieldKind::Text, ""),
                FieldSpec::required("username", FieldKind::Text),
            ],
        )
        .unwrap();

        let required: Vec<_> = descriptor.required_fields().collect();
        assert_eq!(required, vec!["id", "username"]);
        assert!(descriptor.field("email").is_some());
    }

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!(FieldKind::from_str("HTML").unwrap(), FieldKind::Raw);
        assert_eq!(FieldKind::from_str("boolean").unwrap(), FieldKind::Bool);
        assert!(matches!(
            FieldKind::from_str("blob"),
            Err(QuarryError::Schema(_))
        ));
    }
}
