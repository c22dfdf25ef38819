use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Malformed source {}: {reason}", path.display())]
    MalformedSource { path: PathBuf, reason: String },

    #[error("Table [{table}] already exists: {message}")]
    SchemaConflict { table: String, message: String },

    #[error("Unable to retrieve {target}: {reason}")]
    RetrievalFailure { target: String, reason: String },

    #[error("Storage write failed while {context}: {source}")]
    StorageWriteFailure {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IngestError::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn retrieval(target: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::RetrievalFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        IngestError::StorageWriteFailure {
            context: context.into(),
            source,
        }
    }

    /// Retrieval failures end the CLI with a non-zero status before any file
    /// reaches the engine
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(self, IngestError::RetrievalFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
