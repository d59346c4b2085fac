//! Sink Writer: destructive replacement of a destination table.

pub mod memory;
pub mod postgres;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::Result;

use crate::schema::TableSchema;

pub use memory::MemorySink;
pub use postgres::PostgresSink;

/// What a destination reports back about a table after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub row_count: u64,
    pub columns: Vec<String>,
}

#[async_trait]
pub trait Sink: Send {
    /// Drops any table named `table_name`, recreates it from `schema` and
    /// inserts every row of `batch`. Returns the number of rows written.
    async fn replace_table(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64>;

    async fn describe_table(&mut self, table_name: &str) -> Result<TableSummary>;
}
