//! Record mapping
//!
//! This module turns untyped [`SourceRow`]s into validated [`MappedRecord`]s
//! using an [`EntityDescriptor`]. The same mapper serves the batch export path
//! and the single-record event path.
//!
//! Mapping order for every field:
//!
//! 1. Call the field accessor if one is defined, otherwise look up the column
//! 2. Apply the default when the value is absent (or null on a non-nullable field)
//! 3. Validate and clean by [`FieldKind`](crate::core::entity::FieldKind)
//! 4. Run the field rule
//!
//! After all fields: the descriptor's record hook, configured field aliases,
//! and bookkeeping stamps. Any failure rejects the whole record.

pub mod clean;

use crate::core::entity::{EntityDescriptor, FieldSpec};
use crate::core::registry::DatatypeRegistry;
use crate::domain::ids::DatatypeName;
use crate::domain::record::{Crud, MappedRecord};
use crate::domain::row::SourceRow;
use crate::domain::{QuarryError, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Field name used in mapping errors raised by record hooks
const RECORD_HOOK_FIELD: &str = "<record>";

/// Maps source rows to output records
#[derive(Debug, Clone, Default)]
pub struct RecordMapper {
    actor_id: i64,
    aliases: HashMap<String, Vec<(String, String)>>,
}

impl RecordMapper {
    /// Create a mapper stamping `actor_id` on every record
    pub fn new(actor_id: i64) -> Self {
        Self {
            actor_id,
            aliases: HashMap::new(),
        }
    }

    /// Add field aliases keyed as `"<datatype>.<field>" = "<alias>"`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for keys without a `.` separator or
    /// with an invalid datatype name.
    pub fn with_aliases(mut self, aliases: &BTreeMap<String, String>) -> Result<Self> {
        for (key, alias) in aliases {
            let (datatype, field) = key.split_once('.').ok_or_else(|| {
                QuarryError::Configuration(format!(
                    "Invalid field alias key '{key}'. Expected '<datatype>.<field>'"
                ))
            })?;
            DatatypeName::new(datatype).map_err(QuarryError::Configuration)?;
            if field.is_empty() || alias.is_empty() {
                return Err(QuarryError::Configuration(format!(
                    "Field alias '{key}' must name a field and a non-empty alias"
                )));
            }
            let renames = self.aliases.entry(datatype.to_string()).or_default();
            if let Some((other, _)) = renames.iter().find(|(_, existing)| existing == alias) {
                return Err(QuarryError::Configuration(format!(
                    "Field alias '{key}' reuses '{alias}', already the alias of '{datatype}.{other}'"
                )));
            }
            renames.push((field.to_string(), alias.clone()));
        }
        Ok(self)
    }

    /// Reject aliases that would shadow a field the datatype already declares
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first colliding alias.
    pub fn validate_aliases(&self, registry: &DatatypeRegistry) -> Result<()> {
        for entry in registry.all() {
            let Some(renames) = self.aliases.get(entry.name.as_str()) else {
                continue;
            };
            for (field, alias) in renames {
                if alias != field && entry.descriptor.field(alias).is_some() {
                    return Err(QuarryError::Configuration(format!(
                        "Field alias '{}.{field}' = '{alias}' collides with the existing field '{alias}'",
                        entry.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Actor id stamped on records
    pub fn actor_id(&self) -> i64 {
        self.actor_id
    }

    /// Map a row as a historical (created) record
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Mapping`] when a required field is missing or a
    /// value fails type validation, a field rule or the record hook.
    pub fn map(&self, row: &SourceRow, descriptor: &EntityDescriptor) -> Result<MappedRecord> {
        self.map_with(row, descriptor, Crud::Created, None)
    }

    /// Map a row with an explicit CRUD flag and event name
    pub fn map_with(
        &self,
        row: &SourceRow,
        descriptor: &EntityDescriptor,
        crud: Crud,
        event_name: Option<String>,
    ) -> Result<MappedRecord> {
        let datatype = descriptor.name();
        let mut fields = Vec::with_capacity(descriptor.fields().len());

        for spec in descriptor.fields() {
            let value = resolve_field(spec, row)
                .map_err(|reason| mapping_error(datatype, &spec.name, reason, row))?;
            fields.push((spec.name.clone(), value));
        }

        let mut record = MappedRecord {
            datatype: datatype.clone(),
            fields,
            exported_at: Utc::now().timestamp(),
            actor_id: self.actor_id,
            crud,
            event_name,
        };

        if let Some(hook) = descriptor.hook() {
            hook(&mut record)
                .map_err(|reason| mapping_error(datatype, RECORD_HOOK_FIELD, reason, row))?;
        }

        if let Some(aliases) = self.aliases.get(datatype.as_str()) {
            for (field, alias) in aliases {
                if alias != field && record.get(alias).is_some() {
                    return Err(mapping_error(
                        datatype,
                        field,
                        format!("alias '{alias}' collides with an existing field"),
                        row,
                    ));
                }
                if !record.rename(field, alias) {
                    tracing::debug!(
                        datatype = %datatype,
                        field = %field,
                        "Field alias refers to a field the descriptor does not declare"
                    );
                }
            }
        }

        Ok(record)
    }
}

fn resolve_field(spec: &FieldSpec, row: &SourceRow) -> std::result::Result<Value, String> {
    let raw = match spec.accessor {
        Some(accessor) => accessor(row),
        None => row.get(&spec.name).cloned(),
    };

    let value = match raw {
        Some(Value::Null) if spec.nullable => Value::Null,
        None | Some(Value::Null) => match &spec.default {
            Some(Value::Null) => Value::Null,
            Some(default) => clean::clean_value(spec.kind, default)
                .map_err(|e| format!("invalid default: {e}"))?,
            None => return Err("required field is missing or null".to_string()),
        },
        Some(v) => clean::clean_value(spec.kind, &v)?,
    };

    if let (Some(rule), false) = (spec.rule, value.is_null()) {
        rule(&value)?;
    }

    Ok(value)
}

fn mapping_error(
    datatype: &DatatypeName,
    field: &str,
    reason: String,
    row: &SourceRow,
) -> QuarryError {
    QuarryError::mapping(datatype.as_str(), field, reason, row.to_json_string())
}
