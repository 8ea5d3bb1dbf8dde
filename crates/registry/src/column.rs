//! Storage types for synthesized columns.
//!
//! Descriptor schemas use Frictionless table-schema type names.  Only a subset maps onto distinct storage
//! types; the rest collapse to text.

/// Storage type of a synthesized column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// Double-precision float.
    Float,
    /// UTF-8 text.
    Text,
    /// Stored as an integer 0/1.
    Boolean,
    /// ISO date, stored as text.
    Date,
    /// ISO datetime, stored as text.
    DateTime,
    /// A JSON blob, stored as text.
    Json,
}

impl ColumnType {
    /// Map a descriptor field type name to a column type.  Unknown names are rejected so a typo'd
    /// descriptor fails validation instead of silently becoming text.
    pub fn from_descriptor_type(name: &str) -> Option<ColumnType> {
        Some(match name {
            "string" | "array" | "geopoint" | "geojson" | "any" => ColumnType::Text,
            "number" => ColumnType::Float,
            "integer" | "year" | "yearmonth" | "duration" => ColumnType::Integer,
            "boolean" => ColumnType::Boolean,
            "object" => ColumnType::Json,
            "date" => ColumnType::Date,
            "time" | "datetime" => ColumnType::DateTime,
            _ => return None,
        })
    }

    /// The SQL type name used in generated DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Text | ColumnType::Date | ColumnType::DateTime | ColumnType::Json => "TEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_descriptor_type_names() {
        assert_eq!(
            ColumnType::from_descriptor_type("string"),
            Some(ColumnType::Text)
        );
        assert_eq!(
            ColumnType::from_descriptor_type("integer"),
            Some(ColumnType::Integer)
        );
        assert_eq!(
            ColumnType::from_descriptor_type("number"),
            Some(ColumnType::Float)
        );
        assert_eq!(
            ColumnType::from_descriptor_type("object"),
            Some(ColumnType::Json)
        );
        assert_eq!(
            ColumnType::from_descriptor_type("yearmonth"),
            Some(ColumnType::Integer)
        );
        assert_eq!(ColumnType::from_descriptor_type("blob"), None);
    }

    #[test]
    fn sql_types_are_sqlite_storage_classes() {
        assert_eq!(ColumnType::Integer.sql_type(), "INTEGER");
        assert_eq!(ColumnType::Boolean.sql_type(), "INTEGER");
        assert_eq!(ColumnType::Float.sql_type(), "REAL");
        assert_eq!(ColumnType::Json.sql_type(), "TEXT");
    }
}
