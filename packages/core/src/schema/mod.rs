//! Relation/Schema Lookup
//!
//! The engine needs a small amount of schema knowledge to do its job: which
//! fields are relational and where they point, whether a table is
//! localizable and which fields carry its translation pointers, and which
//! foreign tables hold inline relations into a table. That knowledge comes
//! through the [`SchemaLookup`] trait; the bundled [`SchemaRegistry`] serves
//! it from a serde-loaded [`SchemaConfig`].

pub mod config;
pub mod registry;

pub use config::{FieldSchema, RelationSchema, SchemaConfig, TableSchema};
pub use registry::SchemaRegistry;

/// Relation metadata for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationConfig {
    /// Tables the field can point at; more than one makes this a
    /// multi-target "group" relation whose values carry a table prefix
    pub foreign_tables: Vec<String>,

    /// Many-to-many relation (kept on a relation table by the backend)
    pub mm: bool,

    /// Whether the caller-supplied ordering of values is significant
    pub ordered: bool,

    /// Upper bound on the number of related records, if any
    pub max_items: Option<u32>,

    /// Inline (parent-owns-children) relation; the parent field holds the
    /// child count rather than a value list
    pub inline: bool,

    /// For inline relations: the child-side field naming the parent uid
    pub foreign_field: Option<String>,
}

impl RelationConfig {
    /// Whether values need a `table_uid` composite token
    pub fn is_multi_table(&self) -> bool {
        self.foreign_tables.len() > 1
    }

    /// The single target table, when there is exactly one
    pub fn single_foreign_table(&self) -> Option<&str> {
        match self.foreign_tables.as_slice() {
            [table] => Some(table.as_str()),
            _ => None,
        }
    }
}

/// Configuration of one field as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConfig {
    /// Relation metadata; `None` for scalar fields
    pub relation: Option<RelationConfig>,
}

impl FieldConfig {
    /// Whether the schema classifies this field as relational
    pub fn is_relational(&self) -> bool {
        self.relation.is_some()
    }
}

/// One foreign (table, field) holding an inline relation into a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineRelationRef {
    /// Table of the owning parent records
    pub foreign_table: String,

    /// Parent field holding the child count
    pub field: String,

    /// Record types the field applies to (empty = all)
    pub record_types: Vec<String>,

    /// Child-side field naming the parent uid
    pub child_foreign_field: String,
}

/// Schema knowledge the engine consumes.
///
/// Implementations are expected to be cheap, in-memory lookups; the engine
/// consults them for every field of every operation.
pub trait SchemaLookup: Send + Sync {
    /// Field configuration, taking an optional record-type context into
    /// account (a field restricted to certain record types is invisible
    /// outside them)
    fn field_config(
        &self,
        table: &str,
        field: &str,
        record_type: Option<&str>,
    ) -> Option<FieldConfig>;

    /// Whether the table declares the field at all (any record type)
    fn has_field(&self, table: &str, field: &str) -> bool;

    /// Whether records of this table can exist per-language
    fn is_localizable(&self, table: &str) -> bool;

    /// Field carrying the record type discriminator, if the table has one
    fn record_type_field(&self, table: &str) -> Option<String>;

    /// Field holding the numeric language id
    fn language_field(&self, table: &str) -> Option<String>;

    /// Field pointing at the default-language original
    fn translation_origin_field(&self, table: &str) -> Option<String>;

    /// Field pointing at the nearest translation source
    fn translation_source_field(&self, table: &str) -> Option<String>;

    /// All foreign (table, field) combinations holding an inline relation
    /// into `table`
    fn inline_relations_to(&self, table: &str) -> Vec<InlineRelationRef>;
}
