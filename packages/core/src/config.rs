//! Engine Configuration
//!
//! Serde-deserializable settings for the record-operation engine. Loaded
//! from a JSON file in deployments; tests construct it inline. Everything
//! has a sensible default so `BridgeConfig::default()` is a working
//! configuration for a vanilla installation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Marks one (table, field) as relational regardless of what the schema
/// lookup says, optionally only when the operation's data matches a set of
/// field values.
///
/// # Examples
///
/// ```rust
/// use contentbridge_core::config::RelationOverride;
/// use serde_json::json;
///
/// let override_: RelationOverride = serde_json::from_value(json!({
///     "table": "content",
///     "field": "pi_flexform_related",
///     "when": { "CType": "list" }
/// })).unwrap();
/// assert_eq!(override_.table, "content");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationOverride {
    /// Table the override applies to
    pub table: String,

    /// Field the override applies to
    pub field: String,

    /// Field values the operation's data must carry for the override to
    /// apply; `None` applies unconditionally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<HashMap<String, Value>>,
}

impl RelationOverride {
    /// Whether this override matches the operation's data
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match &self.when {
            None => true,
            Some(conditions) => conditions
                .iter()
                .all(|(field, expected)| data.get(field) == Some(expected)),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// The page table copy targets may point at
    pub page_table: String,

    /// Field carrying the storage location of a record
    pub storage_field: String,

    /// Page new records land on when the caller supplies no storage field
    pub default_storage_page: i64,

    /// Separator between a remote ID and its aspect suffixes. Change it if
    /// external IDs legitimately contain the default `|`.
    pub aspect_separator: String,

    /// Fields treated as relational beyond the schema's classification
    pub relation_overrides: Vec<RelationOverride>,

    /// Per-table fields whose value must resolve to a mapped remote ID
    /// before the operation may run; an unmapped value defers the whole
    /// operation instead of parking just the relation
    pub dependency_fields: HashMap<String, Vec<String>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            page_table: "pages".to_string(),
            storage_field: "pid".to_string(),
            default_storage_page: 0,
            aspect_separator: "|".to_string(),
            relation_overrides: Vec::new(),
            dependency_fields: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Whether an override classifies (table, field) as relational for the
    /// given operation data
    pub fn is_relation_override(
        &self,
        table: &str,
        field: &str,
        data: &Map<String, Value>,
    ) -> bool {
        self.relation_overrides
            .iter()
            .any(|o| o.table == table && o.field == field && o.matches(data))
    }

    /// Dependency fields configured for a table
    pub fn dependency_fields_for(&self, table: &str) -> &[String] {
        self.dependency_fields
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
