//! Pipeline Driver: config → source → sink → raw load → transform → transformed load.

use arrow::record_batch::RecordBatch;
use common::config::Settings;
use common::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use crate::logging::RunLogger;
use crate::reader;
use crate::schema::TableSchema;
use crate::sink::{MemorySink, PostgresSink, Sink};
use crate::transform::DataTransformer;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
pub const DEFAULT_LOG_PATH: &str = "log/etl_process.log";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: String,
    pub log_file: PathBuf,
    /// Write to an in-memory sink instead of PostgreSQL.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_PATH),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub rows: u64,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub raw: TableLoad,
    pub transformed: TableLoad,
}

/// Runs the whole job once. Every failure is logged before it is returned.
pub async fn run_etl_pipeline(options: &RunOptions) -> Result<RunReport> {
    let logger = RunLogger::init(&options.log_file)?;
    info!(log_file = %logger.path().display(), "Starting ETL process");

    let result = execute(options).await;
    match &result {
        Ok(report) => info!(
            raw_rows = report.raw.rows,
            transformed_rows = report.transformed.rows,
            "ETL process completed successfully"
        ),
        Err(e) => error!("ETL process failed: {}", e),
    }

    result
}

async fn execute(options: &RunOptions) -> Result<RunReport> {
    let settings = Settings::new(&options.config_path)?;
    info!("Configuration file read successfully");

    let raw = reader::read_csv(&settings.csv_file_path)?;

    if options.dry_run {
        info!("Dry run: tables are kept in memory");
        let mut sink = MemorySink::new();
        return load_and_transform(&settings, &raw, &mut sink).await;
    }

    let mut sink = PostgresSink::connect(&settings.postgresql, settings.insert_batch_rows).await?;
    let report = load_and_transform(&settings, &raw, &mut sink).await?;
    sink.close().await?;

    Ok(report)
}

/// Loads the raw table, transforms it and loads the result, in that order,
/// stopping at the first failure.
pub async fn load_and_transform<S: Sink>(
    settings: &Settings,
    raw: &RecordBatch,
    sink: &mut S,
) -> Result<RunReport> {
    let raw_load = write_table(sink, &settings.tables.raw, raw).await?;

    let transformed = DataTransformer::new().transform(raw).await?;

    let transformed_load = write_table(sink, &settings.tables.transformed, &transformed).await?;

    Ok(RunReport {
        raw: raw_load,
        transformed: transformed_load,
    })
}

async fn write_table<S: Sink>(sink: &mut S, table: &str, batch: &RecordBatch) -> Result<TableLoad> {
    let schema = TableSchema::infer_from_batch(batch);
    let layout = schema
        .columns()
        .iter()
        .map(|col| format!("{}:{}", col.name, col.sql_type))
        .collect::<Vec<_>>()
        .join(",");
    info!(table, columns = %layout, "Inferred table schema");

    let rows = sink.replace_table(table, &schema, batch).await?;

    let summary = sink.describe_table(table).await?;
    if summary.row_count != batch.num_rows() as u64 {
        error!(
            table,
            expected = batch.num_rows(),
            found = summary.row_count,
            "Row count mismatch after load"
        );
        return Err(Error::sink_write(
            table,
            format!(
                "expected {} rows after load, found {}",
                batch.num_rows(),
                summary.row_count
            ),
        ));
    }

    Ok(TableLoad {
        table: table.to_string(),
        rows,
        columns: summary.columns.len(),
    })
}
