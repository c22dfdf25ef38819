//! Batch Loader - Second pass that streams rows into the table in batches

use crate::config::IdentifierQuoting;
use crate::error::{IngestError, Result};
use crate::ingestion::csv_source::CsvSession;
use crate::ingestion::schema_builder::TableSchema;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rows buffered before each insert round-trip
pub const BATCH_CAPACITY: usize = 10_000;

/// Storage rows waiting to be flushed, already in schema column order
#[derive(Debug)]
pub struct InsertBatch {
    rows: Vec<Vec<Option<String>>>,
    capacity: usize,
}

impl InsertBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity.min(BATCH_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Vec<Option<String>>> {
        self.rows.drain(..)
    }
}

impl Default for InsertBatch {
    fn default() -> Self {
        Self::with_capacity(BATCH_CAPACITY)
    }
}

/// Outcome of a load pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Data rows written, excluding any header row
    pub rows_written: u64,

    /// Size of each flush, in order
    pub flushes: Vec<usize>,
}

pub struct BatchLoader {
    quoting: IdentifierQuoting,
    capacity: usize,
}

impl BatchLoader {
    pub fn new(quoting: IdentifierQuoting) -> Self {
        Self {
            quoting,
            capacity: BATCH_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn insert_sql(&self, schema: &TableSchema) -> String {
        let placeholders = vec!["?"; schema.columns.len()].join(",");
        format!(
            "INSERT INTO {} VALUES ({})",
            self.quoting.quote(&schema.table_name),
            placeholders
        )
    }

    /// Rewind the session and insert every data row.
    ///
    /// Values are bound as text; the column affinity declared in the DDL
    /// performs any numeric conversion.
    pub fn load(
        &self,
        schema: &TableSchema,
        session: &mut CsvSession,
        connection: &Connection,
    ) -> Result<LoadSummary> {
        session.restart()?;
        if session.source().has_headers() {
            session.next_row()?;
        }

        let width = schema.source_width();
        let sql = self.insert_sql(schema);
        let mut batch = InsertBatch::with_capacity(self.capacity);
        let mut summary = LoadSummary::default();

        while let Some(row) = session.next_row()? {
            session.expect_width(&row, width)?;
            let mut values = Vec::with_capacity(schema.columns.len());
            if schema.auto_id {
                values.push(None);
            }
            values.extend(row.into_iter().map(Some));
            batch.push(values);

            if batch.is_full() {
                self.flush(&sql, &schema.table_name, &mut batch, connection, &mut summary)?;
            }
        }
        if !batch.is_empty() {
            self.flush(&sql, &schema.table_name, &mut batch, connection, &mut summary)?;
        }

        Ok(summary)
    }

    fn flush(
        &self,
        sql: &str,
        table_name: &str,
        batch: &mut InsertBatch,
        connection: &Connection,
        summary: &mut LoadSummary,
    ) -> Result<()> {
        let size = batch.len();
        let context = || format!("inserting into [{}]", table_name);
        let mut statement = connection
            .prepare_cached(sql)
            .map_err(|e| IngestError::storage(context(), e))?;
        for row in batch.drain() {
            statement
                .execute(params_from_iter(row.iter()))
                .map_err(|e| IngestError::storage(context(), e))?;
        }

        summary.rows_written += size as u64;
        summary.flushes.push(size);
        debug!(
            "Inserted {} record(s) into [{}] ({} total)",
            size, table_name, summary.rows_written
        );
        Ok(())
    }
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new(IdentifierQuoting::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypingPolicy;
    use crate::ingestion::csv_source::CsvSource;
    use crate::ingestion::schema_builder::SchemaBuilder;
    use crate::ingestion::table_materializer::TableMaterializer;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    fn load_csv(
        content: &str,
        headers: bool,
        policy: TypingPolicy,
        loader: BatchLoader,
    ) -> (Connection, Result<LoadSummary>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, content).unwrap();
        let mut session = CsvSource::new(path, b',', encoding_rs::UTF_8, headers, false)
            .open()
            .unwrap();
        let connection = Connection::open_in_memory().unwrap();
        let schema = SchemaBuilder::new(policy).build(&mut session).unwrap();
        TableMaterializer::default().materialize(&schema, &connection).unwrap();
        let summary = loader.load(&schema, &mut session, &connection);
        (connection, summary)
    }

    fn numbered_rows(count: usize) -> String {
        let mut content = String::from("n\n");
        for i in 0..count {
            writeln!(content, "{}", i).unwrap();
        }
        content
    }

    #[test]
    fn test_surrogate_id_assigned() {
        let (connection, summary) = load_csv(
            "name,age\nAlice,30\nBob,41\n",
            true,
            TypingPolicy::Full,
            BatchLoader::default(),
        );
        let summary = summary.unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.flushes, vec![2]);

        let rows: Vec<(i64, String, i64)> = connection
            .prepare("SELECT id, name, age FROM data ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![(1, "Alice".to_string(), 30), (2, "Bob".to_string(), 41)]
        );
    }

    #[test]
    fn test_exact_capacity_has_no_trailing_flush() {
        let (_, summary) = load_csv(
            &numbered_rows(BATCH_CAPACITY),
            true,
            TypingPolicy::Full,
            BatchLoader::default(),
        );
        assert_eq!(summary.unwrap().flushes, vec![BATCH_CAPACITY]);

        let (connection, summary) = load_csv(
            &numbered_rows(BATCH_CAPACITY + 1),
            true,
            TypingPolicy::Quick,
            BatchLoader::default(),
        );
        let summary = summary.unwrap();
        assert_eq!(summary.flushes, vec![BATCH_CAPACITY, 1]);
        assert_eq!(summary.rows_written, BATCH_CAPACITY as u64 + 1);
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, BATCH_CAPACITY as i64 + 1);
    }

    #[test]
    fn test_custom_capacity_splits_batches() {
        let (_, summary) = load_csv(
            &numbered_rows(7),
            true,
            TypingPolicy::Quick,
            BatchLoader::default().with_capacity(3),
        );
        assert_eq!(summary.unwrap().flushes, vec![3, 3, 1]);
    }

    #[test]
    fn test_headerless_rows_all_loaded() {
        let (connection, summary) = load_csv(
            "1,a,x\n2,b,y\n",
            false,
            TypingPolicy::Full,
            BatchLoader::default(),
        );
        assert_eq!(summary.unwrap().rows_written, 2);
        let first: String = connection
            .query_row("SELECT column_2 FROM data WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(first, "a");
    }

    #[test]
    fn test_ragged_row_fails_load() {
        // quick typing stops after the first data row, so only the load pass sees the third
        let (connection, summary) = load_csv(
            "a,b\n1,2\n3,4,5\n",
            true,
            TypingPolicy::Quick,
            BatchLoader::default(),
        );
        match summary {
            Err(IngestError::MalformedSource { reason, .. }) => {
                assert_eq!(reason, "record 3 has 3 fields, expected 2");
            }
            other => panic!("expected MalformedSource, got {:?}", other),
        }
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_insert_sql_has_one_placeholder_per_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "player,score\nann,3\n").unwrap();
        let mut session = CsvSource::new(path, b',', encoding_rs::UTF_8, true, false)
            .open()
            .unwrap();
        let schema = SchemaBuilder::new(TypingPolicy::Quick).build(&mut session).unwrap();

        assert_eq!(
            BatchLoader::default().insert_sql(&schema),
            "INSERT INTO [scores] VALUES (?,?,?)"
        );
        assert_eq!(
            BatchLoader::new(IdentifierQuoting::None).insert_sql(&schema),
            "INSERT INTO scores VALUES (?,?,?)"
        );
    }
}
