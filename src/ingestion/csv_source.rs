//! CSV Source - File session with a rewindable, decoding row cursor
//!
//! A [`CsvSource`] describes the file; [`CsvSource::open`] acquires the handle
//! and returns a [`CsvSession`]. The session is rewound between the inference
//! pass and the load pass rather than reopened. Closing the session (or
//! dropping it on an error path) releases the handle and, for temporary
//! downloads, deletes the file.

use crate::config::ExtractOptions;
use crate::error::{IngestError, Result};
use csv::{ByteRecord, Position, Reader, ReaderBuilder};
use encoding_rs::Encoding;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const UTF8_BOM: char = '\u{feff}';

/// Description of a delimited text file to ingest
#[derive(Clone, Debug)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
    has_headers: bool,
    is_temporary: bool,
}

impl CsvSource {
    pub fn new(
        path: impl Into<PathBuf>,
        delimiter: u8,
        encoding: &'static Encoding,
        has_headers: bool,
        is_temporary: bool,
    ) -> Self {
        Self {
            path: path.into(),
            delimiter,
            encoding,
            has_headers,
            is_temporary,
        }
    }

    pub fn from_options(path: impl Into<PathBuf>, options: &ExtractOptions) -> Result<Self> {
        Ok(Self::new(
            path,
            options.delimiter_byte()?,
            options.resolve_encoding()?,
            options.headers,
            options.is_temporary,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_headers(&self) -> bool {
        self.has_headers
    }

    /// Acquire the file handle
    pub fn open(self) -> Result<CsvSession> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::SourceNotFound(self.path));
            }
            Err(e) => return Err(e.into()),
        };
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(file);
        debug!("Opened {}", self.path.display());
        Ok(CsvSession {
            source: self,
            reader: Some(reader),
            record: ByteRecord::new(),
            records_read: 0,
        })
    }
}

/// An open file plus its read cursor
pub struct CsvSession {
    source: CsvSource,
    reader: Option<Reader<File>>,
    record: ByteRecord,
    records_read: u64,
}

impl CsvSession {
    pub fn source(&self) -> &CsvSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// 1-based number of the record most recently returned by `next_row`
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Seek back to byte 0 and reset the row cursor
    pub fn restart(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "file session already closed",
            ))
        })?;
        reader.seek(Position::new())?;
        self.records_read = 0;
        Ok(())
    }

    /// Next decoded row, or `None` at end of stream
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        if !reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        self.records_read += 1;

        let encoding = self.source.encoding;
        let mut row = Vec::with_capacity(self.record.len());
        for (idx, field) in self.record.iter().enumerate() {
            let decoded = encoding
                .decode_without_bom_handling_and_without_replacement(field)
                .ok_or_else(|| {
                    IngestError::malformed(
                        &self.source.path,
                        format!(
                            "record {} field {} is not valid {}",
                            self.records_read,
                            idx + 1,
                            encoding.name()
                        ),
                    )
                })?;
            row.push(decoded.into_owned());
        }
        if self.records_read == 1 {
            if let Some(first) = row.first_mut() {
                if first.starts_with(UTF8_BOM) {
                    first.remove(0);
                }
            }
        }
        Ok(Some(row))
    }

    /// Fail with `MalformedSource` unless `row` has exactly `width` fields
    pub fn expect_width(&self, row: &[String], width: usize) -> Result<()> {
        if row.len() == width {
            return Ok(());
        }
        Err(IngestError::malformed(
            &self.source.path,
            format!(
                "record {} has {} fields, expected {}",
                self.records_read,
                row.len(),
                width
            ),
        ))
    }

    /// Release the handle; temporary files are deleted afterwards
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.reader.take().is_none() {
            return Ok(());
        }
        debug!("Closed {}", self.source.path.display());
        if self.source.is_temporary {
            remove_temporary(&self.source.path)?;
        }
        Ok(())
    }
}

/// Delete a temporary source file; a file that is already gone is not an error
pub fn remove_temporary(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed temporary file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Drop for CsvSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to clean up {}: {}", self.source.path.display(), e);
        }
    }
}
