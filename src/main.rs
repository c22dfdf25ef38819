use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use csv_to_db::ingestion::{derive_table_name, remove_temporary};
use csv_to_db::sources::{clone_repo, delete_directory, fetch_to_temp_file, find_files, list_csv_files};
use csv_to_db::{open_database, ExtractOptions, Extractor, IdentifierQuoting, TypingPolicy};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "csv-to-db")]
#[command(about = "Load CSV files into a SQLite database, one table per file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert space-separated list of CSV files into database
    File {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Table name to use instead of the file name (single file only)
        #[arg(long)]
        table_name: Option<String>,

        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Convert space-separated directories of CSV files into database
    Dir {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Also search subdirectories
        #[arg(short, long)]
        recursive: bool,

        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Retrieve remote CSV file from URL and input into database
    Url {
        url: String,

        /// Table name to use instead of the remote file name
        #[arg(long)]
        table_name: Option<String>,

        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Retrieve remote git repository and input its CSV files into database
    Git {
        repo: String,

        /// Branch to clone instead of the remote default
        #[arg(short, long)]
        branch: Option<String>,

        #[command(flatten)]
        shared: SharedArgs,
    },
}

impl Command {
    fn shared(&self) -> &SharedArgs {
        match self {
            Command::File { shared, .. }
            | Command::Dir { shared, .. }
            | Command::Url { shared, .. }
            | Command::Git { shared, .. } => shared,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct SharedArgs {
    /// The output database path
    #[arg(short = 'o', long = "db", env = "CSV_TO_DB_DATABASE", default_value = "data.db")]
    db: PathBuf,

    /// Column typing: quick (first data row), full (entire file) or none (all TEXT)
    #[arg(short, long)]
    typing: Option<TypingPolicy>,

    /// Drop tables before creation if they already exist (BEWARE OF DATA LOSS)
    #[arg(short = 'D', long, overrides_with = "no_drop_tables")]
    drop_tables: bool,

    #[arg(long, overrides_with = "drop_tables")]
    no_drop_tables: bool,

    /// The CSV file(s) have a header row
    #[arg(short = 'H', long, overrides_with = "no_headers")]
    headers: bool,

    #[arg(long, overrides_with = "headers")]
    no_headers: bool,

    /// Keep table and column names exactly as found instead of snake_casing them
    #[arg(long)]
    no_normalize: bool,

    /// CSV delimiter; defaults to comma. Accepts `\t` or `tab` for tabs
    #[arg(short = 'x', long, value_parser = parse_delimiter)]
    delimiter: Option<char>,

    /// Input encoding label, e.g. utf8 or windows-1250
    #[arg(short, long)]
    encoding: Option<String>,

    /// Identifier quoting in generated SQL: brackets or none
    #[arg(long)]
    quoting: Option<IdentifierQuoting>,

    /// JSON file with base extraction options; flags given here override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Print progress messages
    #[arg(short, long)]
    verbose: bool,
}

impl SharedArgs {
    fn resolve(&self) -> Result<ExtractOptions> {
        let mut options = match &self.options {
            Some(path) => ExtractOptions::from_json_file(path)?,
            None => ExtractOptions::default(),
        };
        if let Some(typing) = self.typing {
            options.typing_policy = typing;
        }
        if self.drop_tables {
            options.drop_tables = true;
        } else if self.no_drop_tables {
            options.drop_tables = false;
        }
        if self.headers {
            options.headers = true;
        } else if self.no_headers {
            options.headers = false;
        }
        if self.no_normalize {
            options.normalize_identifiers = false;
        }
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
        if let Some(encoding) = &self.encoding {
            options.encoding = encoding.clone();
        }
        if let Some(quoting) = self.quoting {
            options.quoting = quoting;
        }
        options.delimiter_byte()?;
        options.resolve_encoding()?;
        Ok(options)
    }
}

fn parse_delimiter(value: &str) -> std::result::Result<char, String> {
    match value {
        "\\t" | "tab" | "TAB" => Ok('\t'),
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("'{}' is not a single character", value)),
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.command.shared().verbose);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::File {
            paths,
            table_name,
            shared,
        } => {
            let mut options = shared.resolve()?;
            if let Some(table_name) = table_name {
                if paths.len() > 1 {
                    bail!("--table-name can only be used with a single file");
                }
                options.table_name = Some(table_name);
            }
            ingest_files(&shared.db, &paths, options)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Dir {
            paths,
            recursive,
            shared,
        } => {
            let options = shared.resolve()?;
            let mut files = Vec::new();
            for dir in &paths {
                let found = if recursive {
                    find_files(dir, &["*.csv"], true)
                } else {
                    list_csv_files(dir)
                };
                files.extend(found.with_context(|| format!("listing {}", dir.display()))?);
            }
            println!("Found {} file(s) in specified directories", files.len());
            ingest_files(&shared.db, &files, options)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Url {
            url,
            table_name,
            shared,
        } => {
            let mut options = shared.resolve()?;
            let fetched = match fetch_to_temp_file(&url).await {
                Ok(fetched) => fetched,
                Err(e) if e.is_retrieval_failure() => {
                    eprintln!("{}", e);
                    eprintln!("Unable to retrieve file at {}", url);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            };
            let table_name = table_name.unwrap_or_else(|| {
                derive_table_name(
                    Path::new(&fetched.suggested_name),
                    options.normalize_identifiers,
                )
            });
            options.table_name = Some(table_name);
            options.is_temporary = true;
            let ingested = ingest_files(&shared.db, &[fetched.path.clone()], options);
            if ingested.is_err() {
                // the database never opened, so no session owned the download
                if let Err(e) = remove_temporary(&fetched.path) {
                    warn!("Failed to remove {}: {}", fetched.path.display(), e);
                }
            }
            ingested?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Git {
            repo,
            branch,
            shared,
        } => {
            let options = shared.resolve()?;
            let checkout = match clone_repo(&repo, branch.as_deref()) {
                Ok(checkout) => checkout,
                Err(e) if e.is_retrieval_failure() => {
                    eprintln!("{}", e);
                    eprintln!("Unable to clone repository {}", repo);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            };
            let ingested = find_files(&checkout, &["*.csv"], true)
                .map_err(anyhow::Error::from)
                .and_then(|files| {
                    println!("Found {} file(s) in {}", files.len(), repo);
                    ingest_files(&shared.db, &files, options)
                });
            if let Err(e) = delete_directory(&checkout) {
                warn!("Failed to remove clone at {}: {}", checkout.display(), e);
            }
            ingested?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Extract each file over one shared connection. A failing file is reported
/// and skipped; earlier files stay committed.
fn ingest_files(db: &Path, files: &[PathBuf], options: ExtractOptions) -> Result<()> {
    let mut connection =
        open_database(db).with_context(|| format!("opening database {}", db.display()))?;
    let extractor = Extractor::new(options);

    let mut loaded = 0usize;
    for file in files {
        match extractor.extract_file(&mut connection, file) {
            Ok(report) => {
                loaded += 1;
                println!(
                    "Loaded {} row(s) from {} into [{}]",
                    report.rows_written,
                    file.display(),
                    report.table_name
                );
            }
            Err(e) => eprintln!("Failed to load {}: {}", file.display(), e),
        }
    }
    info!("{} of {} file(s) loaded into {}", loaded, files.len(), db.display());

    connection
        .close()
        .map_err(|(_, e)| e)
        .with_context(|| format!("closing database {}", db.display()))?;
    Ok(())
}
