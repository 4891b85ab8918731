//! Schema Configuration
//!
//! Serde-deserializable description of the tables and fields the engine is
//! allowed to write. Installations typically load this from a JSON file
//! generated out of the CMS schema; tests build it inline with `json!`.
//!
//! # Examples
//!
//! ```rust
//! use contentbridge_core::schema::SchemaConfig;
//! use serde_json::json;
//!
//! let config: SchemaConfig = serde_json::from_value(json!({
//!     "tables": {
//!         "pages": {
//!             "localizable": true,
//!             "languageField": "sys_language_uid",
//!             "fields": { "title": {} }
//!         }
//!     }
//! })).unwrap();
//! assert!(config.tables.contains_key("pages"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Relation metadata for one configured field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationSchema {
    /// Tables the field can point at
    pub foreign_tables: Vec<String>,

    /// Many-to-many relation
    pub mm: bool,

    /// Caller-supplied ordering is significant
    pub ordered: bool,

    /// Upper bound on related records
    pub max_items: Option<u32>,

    /// Inline parent-owns-children relation
    pub inline: bool,

    /// Child-side field naming the parent uid (inline relations)
    pub foreign_field: Option<String>,
}

/// One configured field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldSchema {
    /// Relation metadata; absent for scalar fields
    pub relation: Option<RelationSchema>,

    /// Record types the field is available for (`None` = all)
    pub record_types: Option<Vec<String>>,
}

/// One configured table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableSchema {
    /// Whether records of this table exist per-language
    pub localizable: bool,

    /// Field holding the numeric language id
    pub language_field: Option<String>,

    /// Field pointing at the default-language original
    pub translation_origin_field: Option<String>,

    /// Field pointing at the nearest translation source
    pub translation_source_field: Option<String>,

    /// Field carrying the record type discriminator
    pub record_type_field: Option<String>,

    /// Field name → configuration
    pub fields: HashMap<String, FieldSchema>,
}

/// Full schema configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaConfig {
    /// Table name → configuration
    pub tables: HashMap<String, TableSchema>,
}

impl SchemaConfig {
    /// Load a schema configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_table_defaults() {
        let config: SchemaConfig = serde_json::from_value(json!({
            "tables": { "pages": {} }
        }))
        .unwrap();

        let pages = &config.tables["pages"];
        assert!(!pages.localizable);
        assert!(pages.language_field.is_none());
        assert!(pages.fields.is_empty());
    }

    #[test]
    fn test_relation_field_parsing() {
        let config: SchemaConfig = serde_json::from_value(json!({
            "tables": {
                "content": {
                    "fields": {
                        "media": {
                            "relation": {
                                "foreignTables": ["files", "pages"],
                                "mm": true,
                                "ordered": true
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();

        let relation = config.tables["content"].fields["media"]
            .relation
            .as_ref()
            .unwrap();
        assert_eq!(relation.foreign_tables.len(), 2);
        assert!(relation.mm);
        assert!(relation.ordered);
        assert!(!relation.inline);
    }

    #[test]
    fn test_record_type_restriction_parsing() {
        let config: SchemaConfig = serde_json::from_value(json!({
            "tables": {
                "content": {
                    "recordTypeField": "CType",
                    "fields": {
                        "bullet_style": { "recordTypes": ["bullets"] }
                    }
                }
            }
        }))
        .unwrap();

        let field = &config.tables["content"].fields["bullet_style"];
        assert_eq!(field.record_types.as_deref(), Some(&["bullets".to_string()][..]));
    }
}
