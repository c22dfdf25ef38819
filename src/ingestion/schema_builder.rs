//! Schema Builder - Derives table and column definitions from a CSV source

use crate::config::{ExtractOptions, TypingPolicy};
use crate::error::{IngestError, Result};
use crate::ingestion::csv_source::CsvSession;
use crate::ingestion::type_inference::{ColumnTypeAccumulator, SqlType};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Name of the surrogate identifier column
pub const ID_COLUMN: &str = "id";

lazy_static! {
    static ref ACRONYM_BOUNDARY: Regex = Regex::new(r"(\p{Lu}+)(\p{Lu}\p{Ll})").unwrap();
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([\p{Ll}\p{N}])(\p{Lu})").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// One column of the target table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    /// Zero-based position in DDL and in every inserted row
    pub position: usize,
}

/// Table definition derived from one source file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,

    /// Ordered columns; a synthesized `id` is always at position 0
    pub columns: Vec<ColumnSpec>,

    /// Drop an existing table of the same name before creating this one
    pub drop_before_create: bool,

    /// Whether `id` was synthesized, in which case every loaded row gets a
    /// leading null placeholder
    pub auto_id: bool,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of fields every source row must carry
    pub fn source_width(&self) -> usize {
        if self.auto_id {
            self.columns.len() - 1
        } else {
            self.columns.len()
        }
    }
}

/// Schema Builder - first pass over a source
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    table_name: Option<String>,
    normalize_identifiers: bool,
    typing_policy: TypingPolicy,
    drop_before_create: bool,
}

impl SchemaBuilder {
    pub fn new(typing_policy: TypingPolicy) -> Self {
        Self {
            table_name: None,
            normalize_identifiers: true,
            typing_policy,
            drop_before_create: false,
        }
    }

    pub fn from_options(options: &ExtractOptions) -> Self {
        Self {
            table_name: options.table_name.clone(),
            normalize_identifiers: options.normalize_identifiers,
            typing_policy: options.typing_policy,
            drop_before_create: options.drop_tables,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn normalize_identifiers(mut self, normalize: bool) -> Self {
        self.normalize_identifiers = normalize;
        self
    }

    /// Rewind the session and infer the table schema from it
    pub fn build(&self, session: &mut CsvSession) -> Result<TableSchema> {
        session.restart()?;
        let has_headers = session.source().has_headers();

        let first = session.next_row()?.ok_or_else(|| {
            let reason = if has_headers {
                "expected a header row but the file is empty"
            } else {
                "file is empty"
            };
            IngestError::malformed(session.path(), reason)
        })?;
        let width = first.len();

        let mut accumulator = ColumnTypeAccumulator::new(self.typing_policy, width);
        let names: Vec<String> = if has_headers {
            self.header_names(&first)
        } else {
            if accumulator.wants_more() {
                accumulator.observe(first.as_slice());
            }
            (1..=width).map(|idx| format!("column_{}", idx)).collect()
        };

        while accumulator.wants_more() {
            match session.next_row()? {
                Some(row) => {
                    session.expect_width(&row, width)?;
                    accumulator.observe(row.as_slice());
                }
                None => break,
            }
        }
        debug!(
            "Inferred types for {} from {} data row(s) ({} typing)",
            session.path().display(),
            accumulator.rows_seen(),
            self.typing_policy
        );

        let mut columns: Vec<ColumnSpec> = names
            .into_iter()
            .zip(accumulator.finish())
            .enumerate()
            .map(|(position, (name, sql_type))| ColumnSpec {
                name,
                sql_type,
                position,
            })
            .collect();

        let auto_id = !columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(ID_COLUMN));
        if auto_id {
            columns.insert(
                0,
                ColumnSpec {
                    name: ID_COLUMN.to_string(),
                    sql_type: SqlType::IntegerPrimaryKey,
                    position: 0,
                },
            );
            for (position, column) in columns.iter_mut().enumerate() {
                column.position = position;
            }
        }

        Ok(TableSchema {
            table_name: self.resolve_table_name(session.path())?,
            columns,
            drop_before_create: self.drop_before_create,
            auto_id,
        })
    }

    /// Column names from the header row. A blank name becomes `column_N`,
    /// suffixed until it no longer matches another header (SQLite compares
    /// names case-insensitively).
    fn header_names(&self, header: &[String]) -> Vec<String> {
        let named: Vec<String> = header
            .iter()
            .map(|raw| {
                if self.normalize_identifiers {
                    normalize_identifier(raw)
                } else {
                    raw.to_string()
                }
            })
            .collect();
        let mut taken: HashSet<String> = named
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_lowercase())
            .collect();

        named
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                if !name.is_empty() {
                    return name;
                }
                let base = format!("column_{}", idx + 1);
                let mut candidate = base.clone();
                let mut suffix = 2;
                while taken.contains(&candidate.to_lowercase()) {
                    candidate = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                taken.insert(candidate.to_lowercase());
                candidate
            })
            .collect()
    }

    /// Explicit override verbatim, else the (optionally normalized) file stem
    pub fn resolve_table_name(&self, path: &Path) -> Result<String> {
        let name = match &self.table_name {
            Some(explicit) => explicit.clone(),
            None => derive_table_name(path, self.normalize_identifiers),
        };
        if name.is_empty() {
            return Err(IngestError::malformed(
                path,
                "cannot derive a table name from the file name",
            ));
        }
        Ok(name)
    }
}

/// Base file name without its extension, snake-cased when `normalize`
pub fn derive_table_name(path: &Path, normalize: bool) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if normalize {
        normalize_identifier(&stem)
    } else {
        stem
    }
}

/// Lowercase-underscore form of an identifier: `First Name` -> `first_name`,
/// `orderID` -> `order_id`, `HTTPStatus` -> `http_status`
pub fn normalize_identifier(raw: &str) -> String {
    let split = ACRONYM_BOUNDARY.replace_all(raw.trim(), "${1}_${2}");
    let split = CAMEL_BOUNDARY.replace_all(&split, "${1}_${2}");
    let joined = NON_WORD.replace_all(&split, "_");
    joined.trim_matches('_').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::csv_source::CsvSource;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn session_for(dir: &TempDir, name: &str, content: &str, headers: bool) -> CsvSession {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        CsvSource::new(path, b',', encoding_rs::UTF_8, headers, false)
            .open()
            .unwrap()
    }

    fn types(schema: &TableSchema) -> Vec<SqlType> {
        schema.columns.iter().map(|c| c.sql_type).collect()
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("First Name"), "first_name");
        assert_eq!(normalize_identifier("orderID"), "order_id");
        assert_eq!(normalize_identifier("HTTPStatus"), "http_status");
        assert_eq!(normalize_identifier("  Unit Price ($) "), "unit_price");
        assert_eq!(normalize_identifier("already_snake"), "already_snake");
        assert_eq!(normalize_identifier("Sales-2021.Q1"), "sales_2021_q1");
        assert_eq!(normalize_identifier("$$"), "");
    }

    #[test]
    fn test_quick_and_full_typing() {
        let dir = TempDir::new().unwrap();
        let content = "name,age\nAlice,30\nBob,twenty\n";

        let mut session = session_for(&dir, "people.csv", content, true);
        let quick = SchemaBuilder::new(TypingPolicy::Quick).build(&mut session).unwrap();
        assert_eq!(quick.column_names(), vec!["id", "name", "age"]);
        assert_eq!(
            types(&quick),
            vec![SqlType::IntegerPrimaryKey, SqlType::Text, SqlType::Integer]
        );

        let full = SchemaBuilder::new(TypingPolicy::Full).build(&mut session).unwrap();
        assert_eq!(
            types(&full),
            vec![SqlType::IntegerPrimaryKey, SqlType::Text, SqlType::Text]
        );

        let untyped = SchemaBuilder::new(TypingPolicy::None).build(&mut session).unwrap();
        assert_eq!(
            types(&untyped),
            vec![SqlType::IntegerPrimaryKey, SqlType::Text, SqlType::Text]
        );
        assert_eq!(full.table_name, "people");
        assert!(full.auto_id);
    }

    #[test]
    fn test_headerless_columns_are_synthesized() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "points.csv", "1,2.5,a\n3,4,b\n", false);
        let schema = SchemaBuilder::new(TypingPolicy::Full).build(&mut session).unwrap();
        assert_eq!(
            schema.column_names(),
            vec!["id", "column_1", "column_2", "column_3"]
        );
        assert_eq!(
            types(&schema),
            vec![
                SqlType::IntegerPrimaryKey,
                SqlType::Integer,
                SqlType::Real,
                SqlType::Text
            ]
        );
        assert_eq!(schema.source_width(), 3);
        let positions: Vec<usize> = schema.columns.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_natural_id_column_is_kept() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "items.csv", "ID,Item Name\n7,hammer\n", true);
        let schema = SchemaBuilder::new(TypingPolicy::Quick).build(&mut session).unwrap();
        assert!(!schema.auto_id);
        assert_eq!(schema.column_names(), vec!["id", "item_name"]);
        assert_eq!(types(&schema), vec![SqlType::Integer, SqlType::Text]);
    }

    #[test]
    fn test_blank_header_does_not_collide_with_generated_name() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "gaps.csv", "a,,column_2,\n1,2,3,4\n", true);
        let schema = SchemaBuilder::new(TypingPolicy::Quick).build(&mut session).unwrap();
        assert_eq!(
            schema.column_names(),
            vec!["id", "a", "column_2_2", "column_2", "column_4"]
        );

        let connection = rusqlite::Connection::open_in_memory().unwrap();
        crate::ingestion::table_materializer::TableMaterializer::default()
            .materialize(&schema, &connection)
            .unwrap();
    }

    #[test]
    fn test_table_name_override_and_normalization() {
        let builder = SchemaBuilder::new(TypingPolicy::Quick);
        let path = PathBuf::from("/tmp/Monthly Sales.csv");
        assert_eq!(builder.resolve_table_name(&path).unwrap(), "monthly_sales");

        let raw = builder.clone().normalize_identifiers(false);
        assert_eq!(raw.resolve_table_name(&path).unwrap(), "Monthly Sales");

        let named = builder.with_table_name("people");
        assert_eq!(
            named.resolve_table_name(Path::new("/tmp/abc123.csv")).unwrap(),
            "people"
        );
    }

    #[test]
    fn test_empty_file_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "empty.csv", "", true);
        let result = SchemaBuilder::new(TypingPolicy::Quick).build(&mut session);
        assert!(matches!(result, Err(IngestError::MalformedSource { .. })));
    }

    #[test]
    fn test_header_only_file_keeps_integer_guess() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "header_only.csv", "a,b\n", true);
        let schema = SchemaBuilder::new(TypingPolicy::Full).build(&mut session).unwrap();
        assert_eq!(
            types(&schema),
            vec![SqlType::IntegerPrimaryKey, SqlType::Integer, SqlType::Integer]
        );
    }

    #[test]
    fn test_ragged_row_is_malformed_under_full_typing() {
        let dir = TempDir::new().unwrap();
        let mut session = session_for(&dir, "ragged.csv", "a,b\n1,2\n3\n", true);
        let result = SchemaBuilder::new(TypingPolicy::Full).build(&mut session);
        match result {
            Err(IngestError::MalformedSource { reason, .. }) => {
                assert!(reason.contains("record 3"), "{}", reason);
            }
            other => panic!("expected MalformedSource, got {:?}", other),
        }
    }
}
