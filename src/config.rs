//! Extraction options shared by the engine and the CLI

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How much of the source is read before committing to column types
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingPolicy {
    /// Read every data row, widening INTEGER -> REAL -> TEXT
    Full,
    /// Decide from the first data row only
    #[default]
    Quick,
    /// Every column is TEXT; no values are read
    None,
}

impl TypingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypingPolicy::Full => "full",
            TypingPolicy::Quick => "quick",
            TypingPolicy::None => "none",
        }
    }
}

impl fmt::Display for TypingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypingPolicy {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(TypingPolicy::Full),
            "quick" => Ok(TypingPolicy::Quick),
            "none" => Ok(TypingPolicy::None),
            other => Err(IngestError::Configuration(format!(
                "unknown typing policy '{}' (expected full, quick or none)",
                other
            ))),
        }
    }
}

/// Identifier quoting used in generated SQL.
///
/// Bracket quoting does not escape an embedded `]`; names are trusted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierQuoting {
    #[default]
    Brackets,
    None,
}

impl IdentifierQuoting {
    pub fn quote<'a>(&self, identifier: &'a str) -> Cow<'a, str> {
        match self {
            IdentifierQuoting::Brackets => Cow::Owned(format!("[{}]", identifier)),
            IdentifierQuoting::None => Cow::Borrowed(identifier),
        }
    }
}

impl fmt::Display for IdentifierQuoting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierQuoting::Brackets => f.write_str("brackets"),
            IdentifierQuoting::None => f.write_str("none"),
        }
    }
}

impl FromStr for IdentifierQuoting {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "brackets" | "all" => Ok(IdentifierQuoting::Brackets),
            "none" => Ok(IdentifierQuoting::None),
            other => Err(IngestError::Configuration(format!(
                "unknown quoting style '{}' (expected brackets or none)",
                other
            ))),
        }
    }
}

/// Options controlling how a single file is extracted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Explicit table name; otherwise derived from the file name
    pub table_name: Option<String>,

    /// Whether the first row holds column names
    pub headers: bool,

    /// Drop an existing table of the same name before creating it
    pub drop_tables: bool,

    pub typing_policy: TypingPolicy,

    pub delimiter: char,

    /// WHATWG encoding label, e.g. `utf8` or `windows-1250`
    pub encoding: String,

    /// Snake-case table and column names
    pub normalize_identifiers: bool,

    /// Delete the source file once it has been processed
    pub is_temporary: bool,

    pub quoting: IdentifierQuoting,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            table_name: None,
            headers: true,
            drop_tables: false,
            typing_policy: TypingPolicy::Quick,
            delimiter: ',',
            encoding: "utf8".to_string(),
            normalize_identifiers: true,
            is_temporary: false,
            quoting: IdentifierQuoting::Brackets,
        }
    }
}

impl ExtractOptions {
    /// Load options from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Configuration(format!(
                "failed to read options file {}: {}",
                path.display(),
                e
            ))
        })?;
        let options = serde_json::from_str(&content)?;
        Ok(options)
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn temporary(mut self) -> Self {
        self.is_temporary = true;
        self
    }

    /// The delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(IngestError::Configuration(format!(
                "delimiter '{}' is not a single ASCII character",
                self.delimiter
            )))
        }
    }

    pub fn resolve_encoding(&self) -> Result<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            IngestError::Configuration(format!("unknown encoding '{}'", self.encoding))
        })
    }
}
