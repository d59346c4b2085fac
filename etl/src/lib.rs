//! Listings ETL: loads the source CSV into one table, derives the
//! transformed listings and loads them into a second table.

pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod sink;
pub mod transform;

pub use pipeline::{RunOptions, RunReport, TableLoad, load_and_transform, run_etl_pipeline};
pub use schema::{SqlType, TableSchema};
pub use sink::{MemorySink, PostgresSink, Sink, TableSummary};
pub use transform::DataTransformer;
