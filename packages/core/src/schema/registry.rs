//! In-Memory Schema Registry
//!
//! [`SchemaRegistry`] serves [`SchemaLookup`] queries from a loaded
//! [`SchemaConfig`]. The inline-relation reverse index is precomputed at
//! construction so delete-time counter maintenance does not scan the whole
//! configuration per operation.

use crate::schema::config::{RelationSchema, SchemaConfig};
use crate::schema::{FieldConfig, InlineRelationRef, RelationConfig, SchemaLookup};
use std::collections::HashMap;

/// Schema lookup backed by a static configuration
pub struct SchemaRegistry {
    config: SchemaConfig,

    /// child table → inline references pointing at it
    inline_index: HashMap<String, Vec<InlineRelationRef>>,
}

impl SchemaRegistry {
    /// Build a registry, precomputing the inline reverse index
    pub fn new(config: SchemaConfig) -> Self {
        let mut inline_index: HashMap<String, Vec<InlineRelationRef>> = HashMap::new();

        for (table, table_schema) in &config.tables {
            for (field, field_schema) in &table_schema.fields {
                let Some(relation) = &field_schema.relation else {
                    continue;
                };
                if !relation.inline {
                    continue;
                }
                let Some(foreign_field) = &relation.foreign_field else {
                    continue;
                };
                for child_table in &relation.foreign_tables {
                    inline_index
                        .entry(child_table.clone())
                        .or_default()
                        .push(InlineRelationRef {
                            foreign_table: table.clone(),
                            field: field.clone(),
                            record_types: field_schema
                                .record_types
                                .clone()
                                .unwrap_or_default(),
                            child_foreign_field: foreign_field.clone(),
                        });
                }
            }
        }

        Self {
            config,
            inline_index,
        }
    }

    fn relation_config(relation: &RelationSchema) -> RelationConfig {
        RelationConfig {
            foreign_tables: relation.foreign_tables.clone(),
            mm: relation.mm,
            ordered: relation.ordered,
            max_items: relation.max_items,
            inline: relation.inline,
            foreign_field: relation.foreign_field.clone(),
        }
    }
}

impl SchemaLookup for SchemaRegistry {
    fn field_config(
        &self,
        table: &str,
        field: &str,
        record_type: Option<&str>,
    ) -> Option<FieldConfig> {
        let field_schema = self.config.tables.get(table)?.fields.get(field)?;

        // A field restricted to certain record types is invisible outside them.
        if let (Some(allowed), Some(record_type)) = (&field_schema.record_types, record_type) {
            if !allowed.iter().any(|t| t == record_type) {
                return None;
            }
        }

        Some(FieldConfig {
            relation: field_schema.relation.as_ref().map(Self::relation_config),
        })
    }

    fn has_field(&self, table: &str, field: &str) -> bool {
        self.config
            .tables
            .get(table)
            .map(|t| t.fields.contains_key(field))
            .unwrap_or(false)
    }

    fn is_localizable(&self, table: &str) -> bool {
        self.config
            .tables
            .get(table)
            .map(|t| t.localizable)
            .unwrap_or(false)
    }

    fn record_type_field(&self, table: &str) -> Option<String> {
        self.config.tables.get(table)?.record_type_field.clone()
    }

    fn language_field(&self, table: &str) -> Option<String> {
        self.config.tables.get(table)?.language_field.clone()
    }

    fn translation_origin_field(&self, table: &str) -> Option<String> {
        self.config.tables.get(table)?.translation_origin_field.clone()
    }

    fn translation_source_field(&self, table: &str) -> Option<String> {
        self.config.tables.get(table)?.translation_source_field.clone()
    }

    fn inline_relations_to(&self, table: &str) -> Vec<InlineRelationRef> {
        self.inline_index.get(table).cloned().unwrap_or_default()
    }
}
