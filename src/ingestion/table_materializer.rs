//! Table Materializer - Issues the DDL for an inferred schema

use crate::config::IdentifierQuoting;
use crate::error::{IngestError, Result};
use crate::ingestion::schema_builder::TableSchema;
use rusqlite::Connection;
use tracing::{debug, info, warn};

pub struct TableMaterializer {
    quoting: IdentifierQuoting,
}

impl TableMaterializer {
    pub fn new(quoting: IdentifierQuoting) -> Self {
        Self { quoting }
    }

    pub fn drop_table_sql(&self, schema: &TableSchema) -> String {
        format!(
            "DROP TABLE IF EXISTS {}",
            self.quoting.quote(&schema.table_name)
        )
    }

    pub fn create_table_sql(&self, schema: &TableSchema) -> String {
        let columns = schema
            .columns
            .iter()
            .map(|c| format!("\t{} {}", self.quoting.quote(&c.name), c.sql_type.as_sql()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quoting.quote(&schema.table_name),
            columns
        )
    }

    /// Optionally drop, then create the table
    pub fn materialize(&self, schema: &TableSchema, connection: &Connection) -> Result<()> {
        if schema.drop_before_create {
            // best-effort
            match connection.execute(&self.drop_table_sql(schema), []) {
                Ok(_) => debug!("Dropped table [{}] if it existed", schema.table_name),
                Err(e) => warn!("Ignoring failure to drop [{}]: {}", schema.table_name, e),
            }
        }

        let sql = self.create_table_sql(schema);
        debug!("{}", sql);
        connection
            .execute(&sql, [])
            .map_err(|e| map_create_error(&schema.table_name, e))?;

        info!(
            "Created table [{}] with {} column(s)",
            schema.table_name,
            schema.columns.len()
        );
        Ok(())
    }
}

impl Default for TableMaterializer {
    fn default() -> Self {
        Self::new(IdentifierQuoting::default())
    }
}

fn map_create_error(table_name: &str, error: rusqlite::Error) -> IngestError {
    // Bundled SQLite reports prepare-time failures as SqlInputError
    let message = match &error {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        rusqlite::Error::SqlInputError { msg, .. } => msg.clone(),
        other => other.to_string(),
    };
    if message.contains("already exists") {
        return IngestError::SchemaConflict {
            table: table_name.to_string(),
            message,
        };
    }
    IngestError::storage(format!("creating table [{}]", table_name), error)
}
