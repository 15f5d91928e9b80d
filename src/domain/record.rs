//! Mapped output records
//!
//! A [`MappedRecord`] is a validated, cleaned row in the external schema plus
//! the bookkeeping the analytics product expects on every record. Records are
//! serialized to a single JSON line and discarded.

use crate::domain::ids::DatatypeName;
use crate::domain::Result;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// CRUD flag stamped on every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Crud {
    /// Record was created (the default for historical backfill)
    #[default]
    #[serde(rename = "c")]
    Created,
    /// Record was updated
    #[serde(rename = "u")]
    Updated,
    /// Record was deleted
    #[serde(rename = "d")]
    Deleted,
}

impl Crud {
    /// Single-letter wire code
    pub fn as_code(self) -> &'static str {
        match self {
            Crud::Created => "c",
            Crud::Updated => "u",
            Crud::Deleted => "d",
        }
    }
}

impl fmt::Display for Crud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for Crud {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "created" | "create" => Ok(Crud::Created),
            "u" | "updated" | "update" => Ok(Crud::Updated),
            "d" | "deleted" | "delete" => Ok(Crud::Deleted),
            _ => Err(format!("Invalid CRUD flag '{s}'. Expected c, u or d")),
        }
    }
}

/// A fully-typed, validated output record
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    /// Datatype this record belongs to
    pub datatype: DatatypeName,

    /// Field values in descriptor order
    pub fields: Vec<(String, Value)>,

    /// Unix timestamp at which the record was produced
    pub exported_at: i64,

    /// Id of the actor that triggered the export
    pub actor_id: i64,

    /// CRUD flag
    pub crud: Crud,

    /// Name of the event that produced this record, if any
    pub event_name: Option<String>,
}

impl MappedRecord {
    /// Look up a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Replace a field value, returning false when the field does not exist
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => false,
        }
    }

    /// Rename a field in place, keeping its position
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.fields.iter_mut().find(|(name, _)| name == from) {
            Some(slot) => {
                slot.0 = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Serialize as one newline-terminated JSON line
    pub fn to_json_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Field map serialized in descriptor order
struct OrderedFields<'a>(&'a [(String, Value)]);

impl Serialize for OrderedFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for MappedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("datatype", self.datatype.as_str())?;
        map.serialize_entry("crud", &self.crud)?;
        map.serialize_entry("event", &self.event_name)?;
        map.serialize_entry("exported_at", &self.exported_at)?;
        map.serialize_entry("actor_id", &self.actor_id)?;
        map.serialize_entry("data", &OrderedFields(&self.fields))?;
        map.end()
    }
}
