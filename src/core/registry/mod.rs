//! Datatype registry
//!
//! The registry is the read-only directory of datatypes: the static
//! [`catalog`] filtered by configuration. Required datatypes are always
//! selected; optional ones only when listed in `export.datatypes`. Event
//! tracking can be enabled for required datatypes through `export.events`.

pub mod catalog;

use crate::config::ExportConfig;
use crate::core::entity::EntityDescriptor;
use crate::core::query::QuerySpec;
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use catalog::{DatatypeStrategy, STRATEGIES};
use std::collections::HashSet;

/// One datatype with its descriptor and query built
#[derive(Debug, Clone)]
pub struct RegisteredDatatype {
    /// Datatype name
    pub name: DatatypeName,
    /// Always exported
    pub required: bool,
    /// Selected for export by configuration
    pub enabled: bool,
    /// Event-based incremental tracking enabled
    pub events_enabled: bool,
    /// Entity descriptor
    pub descriptor: EntityDescriptor,
    /// Query definition
    pub query: QuerySpec,
}

/// Directory of known datatypes
#[derive(Debug, Clone)]
pub struct DatatypeRegistry {
    entries: Vec<RegisteredDatatype>,
}

impl DatatypeRegistry {
    /// Build the registry from the built-in catalog and export settings
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Schema`] when the settings name an unknown
    /// datatype, or enable event tracking on an optional one.
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::from_strategies(STRATEGIES, &config.datatypes, &config.events)
    }

    /// Build a registry from an explicit strategy table
    pub fn from_strategies(
        strategies: &[DatatypeStrategy],
        enabled: &[String],
        events: &[String],
    ) -> Result<Self> {
        let known: HashSet<&str> = strategies.iter().map(|s| s.name).collect();
        for name in enabled.iter().chain(events) {
            if !known.contains(name.as_str()) {
                return Err(unknown_datatype(name, &known));
            }
        }

        let mut entries = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let mut descriptor = (strategy.descriptor)()?;
            if let Some(hook) = strategy.hook {
                descriptor = descriptor.with_hook(hook);
            }

            let events_enabled = events.iter().any(|e| e == strategy.name);
            if events_enabled && !strategy.required {
                return Err(QuarryError::Schema(format!(
                    "Event tracking is only available for required datatypes, '{}' is optional",
                    strategy.name
                )));
            }

            entries.push(RegisteredDatatype {
                name: descriptor.name().clone(),
                required: strategy.required,
                enabled: strategy.required || enabled.iter().any(|e| e == strategy.name),
                events_enabled,
                descriptor,
                query: (strategy.query)(),
            });
        }

        Ok(Self { entries })
    }

    /// Look up a datatype by name
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Schema`] for unknown datatypes.
    pub fn get(&self, name: &str) -> Result<&RegisteredDatatype> {
        self.entries
            .iter()
            .find(|e| e.name.as_str() == name)
            .ok_or_else(|| {
                let known = self.entries.iter().map(|e| e.name.as_str()).collect();
                unknown_datatype(name, &known)
            })
    }

    /// Selected datatypes, required first, each group in catalog order
    pub fn selected(&self) -> impl Iterator<Item = &RegisteredDatatype> {
        let required = self.entries.iter().filter(|e| e.required);
        let optional = self.entries.iter().filter(|e| !e.required && e.enabled);
        required.chain(optional)
    }

    /// Every known datatype in catalog order
    pub fn all(&self) -> &[RegisteredDatatype] {
        &self.entries
    }
}

fn unknown_datatype(name: &str, known: &HashSet<&str>) -> QuarryError {
    let mut names: Vec<_> = known.iter().copied().collect();
    names.sort_unstable();
    QuarryError::Schema(format!(
        "Unknown datatype '{name}'. Known datatypes: {}",
        names.join(", ")
    ))
}
