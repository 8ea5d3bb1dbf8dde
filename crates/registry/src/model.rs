//! Model definitions.
use anyhow::Result;

use dres_descriptor::{Descriptor, TableSchema};

use crate::ColumnType;

/// A foreign key reference to another table's column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub field: String,
}

/// A column in a synthesized model.
#[derive(Clone, Debug)]
pub struct ColumnDef {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    primary_key: bool,
    foreign_key: Option<ForeignKeyRef>,
}

impl ColumnDef {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn get_foreign_key(&self) -> Option<&ForeignKeyRef> {
        self.foreign_key.as_ref()
    }
}

/// The runtime data-model definition for one table: the thing the migration tool diffs against the live
/// database, and the thing the serving layer introspects for field visibility.
#[derive(Clone, Debug)]
pub struct ModelDefinition {
    table_name: String,
    columns: Vec<ColumnDef>,
}

impl ModelDefinition {
    /// Build the model for a descriptor's field schema.
    ///
    /// Primary-key fields become non-nullable primary keys regardless of their required flag; other
    /// fields are NOT NULL exactly when required.  Fields named in a `foreignKeys` entry pick up a
    /// reference to the first referenced field.
    pub fn synthesize(descriptor: &Descriptor) -> Result<ModelDefinition> {
        let schema = descriptor.get_schema();
        let mut columns: Vec<ColumnDef> = vec![];

        for field in &schema.fields {
            if columns.iter().any(|c| c.name == field.name) {
                anyhow::bail!(
                    "table '{}': duplicate field '{}'",
                    descriptor.get_table_name(),
                    field.name
                );
            }

            let column_type = ColumnType::from_descriptor_type(&field.field_type).ok_or_else(|| {
                anyhow::anyhow!(
                    "table '{}': field '{}' has unknown type '{}'",
                    descriptor.get_table_name(),
                    field.name,
                    field.field_type
                )
            })?;

            let primary_key = schema.primary_key.iter().any(|pk| pk == &field.name);
            let nullable = !primary_key && !field.is_required();

            columns.push(ColumnDef {
                name: field.name.clone(),
                column_type,
                nullable,
                primary_key,
                foreign_key: find_foreign_key(schema, &field.name),
            });
        }

        if columns.is_empty() {
            anyhow::bail!(
                "table '{}' declares no fields",
                descriptor.get_table_name()
            );
        }

        Ok(ModelDefinition {
            table_name: descriptor.get_table_name().to_string(),
            columns,
        })
    }

    pub fn get_table_name(&self) -> &str {
        &self.table_name
    }

    pub fn iter_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key columns, in schema order.
    pub fn iter_primary_key(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

fn find_foreign_key(schema: &TableSchema, field_name: &str) -> Option<ForeignKeyRef> {
    for foreign_key in &schema.foreign_keys {
        if foreign_key.fields.iter().any(|f| f == field_name) {
            return Some(ForeignKeyRef {
                table: foreign_key.reference.resource.clone(),
                field: foreign_key.reference.fields.first()?.clone(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn parse(doc: serde_json::Value) -> Descriptor {
        Descriptor::parse(&doc, "test.json").expect("Descriptor should parse")
    }

    fn programs_descriptor() -> Descriptor {
        parse(serde_json::json!({
            "api": {"resource": "programs", "methods": [{"get": {"enabled": true, "secured": false, "grants": []}}]},
            "datastore": {
                "tablename": "programs",
                "schema": {
                    "fields": [
                        {"name": "id", "type": "integer"},
                        {"name": "name", "type": "string", "required": true},
                        {"name": "hours", "type": "number", "constraints": {"required": true}},
                        {"name": "provider_id", "type": "integer"}
                    ],
                    "primaryKey": "id",
                    "foreignKeys": [
                        {"fields": "provider_id", "reference": {"resource": "providers", "fields": "id"}}
                    ]
                }
            }
        }))
    }

    #[test]
    fn synthesizes_keys_nullability_and_references() {
        let model = ModelDefinition::synthesize(&programs_descriptor()).unwrap();
        assert_eq!(model.get_table_name(), "programs");
        assert_eq!(model.iter_columns().count(), 4);

        let id = model.get_column("id").unwrap();
        assert!(id.is_primary_key());
        assert!(!id.is_nullable());

        // Required via the top-level flag.
        assert!(!model.get_column("name").unwrap().is_nullable());
        // Required via the constraints block.
        assert!(!model.get_column("hours").unwrap().is_nullable());

        let provider = model.get_column("provider_id").unwrap();
        assert!(provider.is_nullable());
        assert_eq!(
            provider.get_foreign_key(),
            Some(&ForeignKeyRef {
                table: "providers".to_string(),
                field: "id".to_string()
            })
        );
    }

    #[test]
    fn synthesis_is_repeatable() {
        let descriptor = programs_descriptor();
        let a = ModelDefinition::synthesize(&descriptor).unwrap();
        let b = ModelDefinition::synthesize(&descriptor).unwrap();
        let names_a: Vec<&str> = a.iter_columns().map(|c| c.get_name()).collect();
        let names_b: Vec<&str> = b.iter_columns().map(|c| c.get_name()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn unknown_field_type_is_an_error() {
        let descriptor = parse(serde_json::json!({
            "api": {"resource": "x", "methods": [{"get": {"enabled": true, "secured": false, "grants": []}}]},
            "datastore": {
                "tablename": "x",
                "schema": {"fields": [{"name": "id", "type": "uuid"}], "primaryKey": "id"}
            }
        }));
        assert!(ModelDefinition::synthesize(&descriptor).is_err());
    }

    #[test]
    fn duplicate_fields_are_an_error() {
        let descriptor = parse(serde_json::json!({
            "api": {"resource": "x", "methods": [{"get": {"enabled": true, "secured": false, "grants": []}}]},
            "datastore": {
                "tablename": "x",
                "schema": {
                    "fields": [
                        {"name": "id", "type": "integer"},
                        {"name": "id", "type": "string"}
                    ],
                    "primaryKey": "id"
                }
            }
        }));
        assert!(ModelDefinition::synthesize(&descriptor).is_err());
    }
}
