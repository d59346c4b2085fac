//! Dataset Reader: loads the delimited source file into one Arrow batch.

use arrow::array::{Array, AsArray};
use arrow::compute::{cast, concat_batches};
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{ErrorKind, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{ID, RAW_COLUMNS};

pub const DEFAULT_DELIMITER: u8 = b',';
const BATCH_SIZE: usize = 8192;

// Cells read as missing: empty, plus the usual spreadsheet/dataframe NA markers.
static NULL_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:|#N/A|#N/A N/A|#NA|-1\.#IND|-1\.#QNAN|-NaN|-nan|1\.#IND|1\.#QNAN|<NA>|N/A|NA|NULL|NaN|None|n/a|nan|null)$",
    )
    .expect("Invalid null token regex")
});

/// Reads a comma-delimited file with a header row.
pub fn read_csv(path: &Path) -> Result<RecordBatch> {
    read_delimited(path, DEFAULT_DELIMITER)
}

/// Reads a delimited file with a header row, inferring column types from
/// the whole file. Empty cells and NA markers (`NA`, `N/A`, `NULL`, `NaN`,
/// `None`, ...) become nulls and do not take part in type inference.
pub fn read_delimited(path: &Path, delimiter: u8) -> Result<RecordBatch> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            error!("CSV file not found at {}", path.display());
            Error::SourceNotFound(path.to_path_buf())
        } else {
            error!("Error opening CSV file {}: {}", path.display(), e);
            Error::source_malformed(path, e)
        }
    })?;

    let is_empty = file
        .metadata()
        .map(|meta| meta.len() == 0)
        .map_err(|e| Error::source_malformed(path, e))?;
    if is_empty {
        return Err(empty_source(path));
    }

    let format = Format::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .with_null_regex(Regex::clone(&NULL_TOKENS));
    let (schema, records_read) = format
        .infer_schema(&mut file, None)
        .map_err(|e| malformed_source(path, e))?;

    if records_read == 0 || schema.fields().is_empty() {
        return Err(empty_source(path));
    }
    debug!(?schema, records_read, "Inferred CSV schema");

    file.rewind().map_err(|e| Error::source_malformed(path, e))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(delimiter)
        .with_null_regex(Regex::clone(&NULL_TOKENS))
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .map_err(|e| malformed_source(path, e))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(|e| malformed_source(path, e))?);
    }

    let table = concat_batches(&schema, &batches).map_err(|e| malformed_source(path, e))?;
    if table.num_rows() == 0 {
        return Err(empty_source(path));
    }

    check_listing_columns(&table);
    info!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "CSV file read successfully"
    );

    Ok(table)
}

fn empty_source(path: &Path) -> Error {
    error!("CSV file is empty or contains no data: {}", path.display());
    Error::SourceEmpty(path.to_path_buf())
}

fn malformed_source(path: &Path, err: arrow::error::ArrowError) -> Error {
    error!("Error parsing CSV file {}: {}", path.display(), err);
    Error::source_malformed(path, err)
}

/// Warns about listing columns the file does not carry and about repeated
/// `id` values, returning the number of repeats. Neither stops the run; the
/// transform step reports the columns it actually needs.
fn check_listing_columns(table: &RecordBatch) -> usize {
    let schema = table.schema();
    let missing: Vec<&str> = RAW_COLUMNS
        .iter()
        .copied()
        .filter(|name| schema.index_of(name).is_err())
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "CSV file lacks expected listing columns");
    }

    let Some(ids) = table.column_by_name(ID) else {
        return 0;
    };
    let Ok(ids) = cast(ids, &DataType::Utf8) else {
        return 0;
    };
    let ids = ids.as_string::<i32>();

    let mut seen = HashSet::with_capacity(ids.len());
    let duplicates = ids
        .iter()
        .flatten()
        .filter(|id| !seen.insert(*id))
        .count();
    if duplicates > 0 {
        warn!(duplicates, "Column `{}` holds repeated values", ID);
    }
    duplicates
}
