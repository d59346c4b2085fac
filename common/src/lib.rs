use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use std::path::PathBuf;
use thiserror::Error;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("Error parsing config file: {0}")]
    ConfigMalformed(#[from] ::config::ConfigError),

    #[error("CSV file not found at {0}")]
    SourceNotFound(PathBuf),

    #[error("CSV file is empty or contains no data: {0}")]
    SourceEmpty(PathBuf),

    #[error("Error parsing CSV file {path}: {reason}")]
    SourceMalformed { path: PathBuf, reason: String },

    #[error("PostgreSQL connection failed: {0}")]
    SinkConnectionFailed(#[source] sqlx::Error),

    #[error("Error loading data into table {table}: {reason}")]
    SinkWriteFailed { table: String, reason: String },

    #[error("Error transforming data: {0}")]
    TransformFailed(String),

    #[error("Logging setup failed: {0}")]
    Logging(#[source] std::io::Error),
}

impl Error {
    pub fn source_malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::SourceMalformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(table: &str, reason: impl ToString) -> Self {
        Error::SinkWriteFailed {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ArrowError> for Error {
    fn from(err: ArrowError) -> Self {
        Error::TransformFailed(format!("Arrow error: {}", err))
    }
}

impl From<DataFusionError> for Error {
    fn from(err: DataFusionError) -> Self {
        Error::TransformFailed(format!("DataFusion error: {}", err))
    }
}
