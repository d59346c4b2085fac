use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::{Error, Result};
use std::collections::HashMap;
use tracing::{error, info};

use super::{Sink, TableSummary};
use crate::schema::TableSchema;

#[derive(Debug, Clone)]
pub struct StoredTable {
    pub schema: TableSchema,
    pub batch: RecordBatch,
}

/// Keeps written tables in process memory. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: HashMap<String, StoredTable>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&StoredTable> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn replace_table(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64> {
        if schema.len() != batch.num_columns() {
            error!(
                table = table_name,
                "Schema has {} columns but data has {}",
                schema.len(),
                batch.num_columns()
            );
            return Err(Error::sink_write(
                table_name,
                format!(
                    "schema has {} columns but data has {}",
                    schema.len(),
                    batch.num_columns()
                ),
            ));
        }

        self.tables.insert(
            table_name.to_string(),
            StoredTable {
                schema: schema.clone(),
                batch: batch.clone(),
            },
        );
        info!(table = table_name, rows = batch.num_rows(), "Replaced in-memory table");

        Ok(batch.num_rows() as u64)
    }

    async fn describe_table(&mut self, table_name: &str) -> Result<TableSummary> {
        let stored = self
            .tables
            .get(table_name)
            .ok_or_else(|| Error::sink_write(table_name, "table does not exist"))?;

        Ok(TableSummary {
            row_count: stored.batch.num_rows() as u64,
            columns: stored.schema.names().map(str::to_string).collect(),
        })
    }
}
