//! Remote retrieval - downloads a CSV file over HTTP into a temporary file

use crate::error::{IngestError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Response, Url};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

const FALLBACK_FILE_NAME: &str = "download.csv";

/// Downloaded file plus the name the remote side gave it
#[derive(Debug)]
pub struct FetchedFile {
    /// Temporary local copy; the caller owns its deletion
    pub path: PathBuf,

    /// Last path segment of the URL, e.g. `people.csv`
    pub suggested_name: String,
}

/// Last non-empty path segment of `url`, without query or fragment
pub fn suggested_file_name(url: &str) -> String {
    let name = match Url::parse(url) {
        Ok(parsed) => parsed.path_segments().and_then(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string)
        }),
        Err(_) => url
            .split(&['?', '#'][..])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(str::to_string),
    };
    name.unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Stream `url` into a persisted temporary file, showing a progress bar.
///
/// Nothing is left on disk when the download fails.
pub async fn fetch_to_temp_file(url: &str) -> Result<FetchedFile> {
    let response = reqwest::get(url)
        .await
        .and_then(Response::error_for_status)
        .map_err(|e| IngestError::retrieval(url, e))?;

    let (mut file, path) = tempfile::Builder::new()
        .prefix("csv-to-db-")
        .suffix(".csv")
        .tempfile()?
        .keep()
        .map_err(|e| IngestError::Io(e.error))?;

    let progress = progress_bar(response.content_length());
    let streamed = stream_into(response, &mut file, &progress, url).await;
    progress.finish_and_clear();
    drop(file);

    match streamed {
        Ok(bytes) => {
            info!("Downloaded {} byte(s) from {} to {}", bytes, url, path.display());
            Ok(FetchedFile {
                path,
                suggested_name: suggested_file_name(url),
            })
        }
        Err(e) => {
            if let Err(remove_error) = std::fs::remove_file(&path) {
                warn!("Failed to remove partial download {}: {}", path.display(), remove_error);
            }
            Err(e)
        }
    }
}

async fn stream_into(
    mut response: Response,
    file: &mut File,
    progress: &ProgressBar,
    url: &str,
) -> Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| IngestError::retrieval(url, e))?
    {
        file.write_all(&chunk)?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush()?;
    Ok(written)
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        }
        None => ProgressBar::new_spinner(),
    }
}
