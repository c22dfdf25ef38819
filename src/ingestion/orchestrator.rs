//! Extraction Orchestrator - Runs one file through inference, DDL and load
//!
//! Each file is processed inside its own transaction on the caller's
//! connection: the table only becomes visible once every row is written.

use crate::config::ExtractOptions;
use crate::error::{IngestError, Result};
use crate::ingestion::batch_loader::BatchLoader;
use crate::ingestion::csv_source::{remove_temporary, CsvSession, CsvSource};
use crate::ingestion::schema_builder::{SchemaBuilder, TableSchema};
use crate::ingestion::table_materializer::TableMaterializer;
use crate::ingestion::ExtractReport;
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

/// Extraction Orchestrator - one configured pipeline, reusable across files
pub struct Extractor {
    options: ExtractOptions,
    schema_builder: SchemaBuilder,
    materializer: TableMaterializer,
    loader: BatchLoader,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            schema_builder: SchemaBuilder::from_options(&options),
            materializer: TableMaterializer::new(options.quoting),
            loader: BatchLoader::new(options.quoting),
            options,
        }
    }

    /// Replace the loader, e.g. to change the batch capacity
    pub fn with_loader(mut self, loader: BatchLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Infer, create and load one file, committing once the load succeeds.
    ///
    /// The file session is closed on every exit path; temporary sources are
    /// deleted even when ingestion fails.
    pub fn extract_file(
        &self,
        connection: &mut Connection,
        file_path: impl AsRef<Path>,
    ) -> Result<ExtractReport> {
        let file_path = file_path.as_ref();
        let opened = CsvSource::from_options(file_path, &self.options).and_then(CsvSource::open);
        let mut session = match opened {
            Ok(session) => session,
            Err(e) => {
                self.discard_source(file_path);
                return Err(e);
            }
        };

        info!("Extracting {}", file_path.display());
        let outcome = self.run_passes(&mut session, connection);
        let closed = session.close();

        let report = outcome?;
        closed?;
        info!(
            "Loaded {} row(s) from {} into [{}]",
            report.rows_written,
            file_path.display(),
            report.table_name
        );
        Ok(report)
    }

    /// Delete a temporary source that never reached a file session
    fn discard_source(&self, file_path: &Path) {
        if !self.options.is_temporary {
            return;
        }
        if let Err(e) = remove_temporary(file_path) {
            warn!("Failed to remove {}: {}", file_path.display(), e);
        }
    }

    fn run_passes(
        &self,
        session: &mut CsvSession,
        connection: &mut Connection,
    ) -> Result<ExtractReport> {
        let schema = self.schema_builder.build(session)?;
        log_schema(&schema);

        let tx = connection
            .transaction()
            .map_err(|e| IngestError::storage("starting transaction", e))?;
        self.materializer.materialize(&schema, &tx)?;
        let summary = self.loader.load(&schema, session, &tx)?;
        tx.commit().map_err(|e| {
            IngestError::storage(format!("committing [{}]", schema.table_name), e)
        })?;

        Ok(ExtractReport {
            table_name: schema.table_name,
            rows_written: summary.rows_written,
            batches: summary.flushes.len(),
        })
    }
}

fn log_schema(schema: &TableSchema) {
    let columns = schema
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    info!("Schema for [{}]: {}", schema.table_name, columns);
}

/// Open `database_path`, extract `file_path` into it and close the connection
pub fn extract(
    database_path: impl AsRef<Path>,
    file_path: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    let extractor = Extractor::new(options.clone());
    let mut connection = match open_database(database_path) {
        Ok(connection) => connection,
        Err(e) => {
            extractor.discard_source(file_path.as_ref());
            return Err(e);
        }
    };
    extractor.extract_file(&mut connection, file_path)
}

/// Open (or create) the single-file database
pub fn open_database(database_path: impl AsRef<Path>) -> Result<Connection> {
    let database_path = database_path.as_ref();
    Connection::open(database_path).map_err(|e| {
        IngestError::storage(format!("opening database {}", database_path.display()), e)
    })
}
