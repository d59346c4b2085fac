use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::config::PostgresConfig;
use common::{Error, Result};
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::query_builder::Separated;
use sqlx::{Connection, QueryBuilder};
use tracing::{debug, error, info};

use super::{Sink, TableSummary};
use crate::schema::{SqlType, TableSchema};

/// PostgreSQL caps a single statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Writes tables over one connection, opened once per run.
pub struct PostgresSink {
    conn: PgConnection,
    insert_batch_rows: usize,
}

impl PostgresSink {
    pub async fn connect(config: &PostgresConfig, insert_batch_rows: usize) -> Result<Self> {
        let url = config.connection_url()?;
        info!("PostgreSQL connection string: {}", config.redacted_url());

        let conn = PgConnection::connect(url.as_str()).await.map_err(|e| {
            error!(
                "Error connecting to PostgreSQL at {}: {}",
                config.redacted_url(),
                e
            );
            Error::SinkConnectionFailed(e)
        })?;

        Ok(Self {
            conn,
            insert_batch_rows: insert_batch_rows.max(1),
        })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(Error::SinkConnectionFailed)
    }

    async fn write_table(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64> {
        if schema.is_empty() || schema.len() != batch.num_columns() {
            return Err(Error::sink_write(
                table_name,
                format!(
                    "schema has {} columns but data has {}",
                    schema.len(),
                    batch.num_columns()
                ),
            ));
        }

        let columns = schema
            .columns()
            .iter()
            .zip(batch.columns())
            .map(|(def, array)| ColumnValues::new(array, def.sql_type))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::sink_write(table_name, e))?;

        let rows_per_insert = rows_per_insert(schema.len(), self.insert_batch_rows);
        let insert_prefix = insert_prefix(table_name, schema);
        let num_rows = batch.num_rows();

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| Error::sink_write(table_name, e))?;

        sqlx::query(&drop_table_sql(table_name))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::sink_write(table_name, e))?;
        sqlx::query(&create_table_sql(table_name, schema))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::sink_write(table_name, e))?;
        info!(table = table_name, "Table schema created successfully");

        let mut start = 0;
        while start < num_rows {
            let end = (start + rows_per_insert).min(num_rows);
            let mut builder = insert_statement(&insert_prefix, &columns, start..end);
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::sink_write(table_name, e))?;
            debug!(table = table_name, start, end, "Inserted rows");
            start = end;
        }

        tx.commit()
            .await
            .map_err(|e| Error::sink_write(table_name, e))?;

        Ok(num_rows as u64)
    }
}

#[async_trait]
impl Sink for PostgresSink {
    async fn replace_table(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64> {
        let written = self
            .write_table(table_name, schema, batch)
            .await
            .inspect_err(|e| error!("Error loading data to PostgreSQL: {}", e))?;
        info!("Data loaded successfully into {} table", table_name);
        Ok(written)
    }

    async fn describe_table(&mut self, table_name: &str) -> Result<TableSummary> {
        let row_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(table_name)
        ))
        .fetch_one(&mut self.conn)
        .await
        .map_err(|e| Error::sink_write(table_name, e))?;

        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table_name)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| Error::sink_write(table_name, e))?;

        Ok(TableSummary {
            row_count: row_count.max(0) as u64,
            columns,
        })
    }
}

/// One destination column, cast to the Arrow type its SQL type binds from.
enum ColumnValues {
    Integer(Int64Array),
    Float(Float64Array),
    Boolean(BooleanArray),
    Date(Date32Array),
    Text(StringArray),
}

impl ColumnValues {
    fn new(array: &ArrayRef, sql_type: SqlType) -> std::result::Result<Self, ArrowError> {
        Ok(match sql_type {
            SqlType::Integer => {
                Self::Integer(cast(array, &DataType::Int64)?.as_primitive::<Int64Type>().clone())
            }
            SqlType::Float => Self::Float(
                cast(array, &DataType::Float64)?
                    .as_primitive::<Float64Type>()
                    .clone(),
            ),
            SqlType::Boolean => Self::Boolean(cast(array, &DataType::Boolean)?.as_boolean().clone()),
            // Timestamps keep only their calendar date
            SqlType::Date => Self::Date(
                cast(array, &DataType::Date32)?
                    .as_primitive::<Date32Type>()
                    .clone(),
            ),
            SqlType::Text => Self::Text(cast(array, &DataType::Utf8)?.as_string::<i32>().clone()),
        })
    }

    fn push_bind(&self, row: &mut Separated<'_, '_, Postgres, &'static str>, idx: usize) {
        match self {
            ColumnValues::Integer(values) => {
                row.push_bind(values.is_valid(idx).then(|| values.value(idx)));
            }
            ColumnValues::Float(values) => {
                row.push_bind(values.is_valid(idx).then(|| values.value(idx)));
            }
            ColumnValues::Boolean(values) => {
                row.push_bind(values.is_valid(idx).then(|| values.value(idx)));
            }
            ColumnValues::Date(values) => {
                row.push_bind(
                    values
                        .is_valid(idx)
                        .then(|| values.value_as_date(idx))
                        .flatten(),
                );
            }
            ColumnValues::Text(values) => {
                row.push_bind(values.is_valid(idx).then(|| values.value(idx).to_string()));
            }
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn drop_table_sql(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
}

fn create_table_sql(table_name: &str, schema: &TableSchema) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|col| format!("{} {}", quote_ident(&col.name), col.sql_type.ddl()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table_name), columns)
}

fn insert_prefix(table_name: &str, schema: &TableSchema) -> String {
    let columns = schema
        .names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) ", quote_ident(table_name), columns)
}

fn rows_per_insert(num_columns: usize, insert_batch_rows: usize) -> usize {
    (MAX_BIND_PARAMS / num_columns.max(1))
        .min(insert_batch_rows)
        .max(1)
}

fn insert_statement(
    prefix: &str,
    columns: &[ColumnValues],
    rows: std::ops::Range<usize>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(prefix);
    builder.push_values(rows, |mut row, idx| {
        for values in columns {
            values.push_bind(&mut row, idx);
        }
    });
    builder
}
