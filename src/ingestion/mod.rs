//! Ingestion Module - CSV type inference and bulk loading
//!
//! Handles one delimited file at a time:
//! - File session with a rewindable cursor
//! - Column type inference (full / quick / none)
//! - Table creation
//! - Batched inserts

pub mod batch_loader;
pub mod csv_source;
pub mod orchestrator;
pub mod schema_builder;
pub mod table_materializer;
pub mod type_inference;

pub use batch_loader::{BatchLoader, InsertBatch, LoadSummary, BATCH_CAPACITY};
pub use csv_source::{remove_temporary, CsvSession, CsvSource};
pub use orchestrator::{extract, open_database, Extractor};
pub use schema_builder::{
    derive_table_name, normalize_identifier, ColumnSpec, SchemaBuilder, TableSchema,
};
pub use table_materializer::TableMaterializer;
pub use type_inference::{classify_column, classify_value, ColumnTypeAccumulator, SqlType};

use serde::{Deserialize, Serialize};

/// Result of extracting one file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Table the rows were written to
    pub table_name: String,

    /// Data rows written (header excluded)
    pub rows_written: u64,

    /// Number of insert batches flushed
    pub batches: usize,
}
