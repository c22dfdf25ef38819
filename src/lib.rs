pub mod config;
pub mod error;
pub mod ingestion;
pub mod sources;

pub use config::{ExtractOptions, IdentifierQuoting, TypingPolicy};
pub use error::{IngestError, Result};
pub use ingestion::{extract, open_database, ExtractReport, Extractor};
