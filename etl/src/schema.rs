//! Schema Inferencer: maps each column's Arrow type to a destination column type.

use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Float,
    Boolean,
    Date,
    Text,
}

impl SqlType {
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => SqlType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => SqlType::Float,
            DataType::Boolean => SqlType::Boolean,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => SqlType::Date,
            _ => SqlType::Text,
        }
    }

    /// PostgreSQL column type.
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Integer => "BIGINT",
            SqlType::Float => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::Text => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Integer => "Integer",
            SqlType::Float => "Float",
            SqlType::Boolean => "Boolean",
            SqlType::Date => "Date",
            SqlType::Text => "Text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

/// Destination columns in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn infer(schema: &Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| ColumnDef {
                name: field.name().clone(),
                sql_type: SqlType::from_arrow(field.data_type()),
            })
            .collect();
        Self { columns }
    }

    /// Re-run for every table at write time, keyed only by its own columns.
    pub fn infer_from_batch(batch: &RecordBatch) -> Self {
        Self::infer(batch.schema().as_ref())
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<SqlType> {
        self.columns
            .iter()
            .find(|col| col.name == name)
            .map(|col| col.sql_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|col| col.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    #[test]
    fn test_type_mapping() {
        assert_eq!(SqlType::from_arrow(&DataType::Int64), SqlType::Integer);
        assert_eq!(SqlType::from_arrow(&DataType::UInt32), SqlType::Integer);
        assert_eq!(SqlType::from_arrow(&DataType::Float64), SqlType::Float);
        assert_eq!(SqlType::from_arrow(&DataType::Boolean), SqlType::Boolean);
        assert_eq!(SqlType::from_arrow(&DataType::Date32), SqlType::Date);
        assert_eq!(
            SqlType::from_arrow(&DataType::Timestamp(TimeUnit::Microsecond, None)),
            SqlType::Date
        );
        assert_eq!(SqlType::from_arrow(&DataType::Utf8), SqlType::Text);
        assert_eq!(SqlType::from_arrow(&DataType::Null), SqlType::Text);
    }

    #[test]
    fn test_time_of_day_is_text() {
        assert_eq!(
            SqlType::from_arrow(&DataType::Time64(TimeUnit::Microsecond)),
            SqlType::Text
        );
    }

    #[test]
    fn test_infer_keeps_column_order() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("price", DataType::Float64, true),
        ]);
        let table = TableSchema::infer(&schema);

        assert_eq!(table.len(), 3);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["id", "name", "price"]);
        assert_eq!(table.get("price"), Some(SqlType::Float));
        assert_eq!(table.get("missing"), None);
    }

    #[test]
    fn test_ddl_names() {
        assert_eq!(SqlType::Integer.ddl(), "BIGINT");
        assert_eq!(SqlType::Text.to_string(), "Text");
    }
}
