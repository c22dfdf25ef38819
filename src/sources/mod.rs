//! Sources - where CSV files come from before they reach the engine
//!
//! Local discovery, HTTP downloads and git clones. All of them hand the
//! engine a local path; none of them run while a file is being ingested.

pub mod discovery;
pub mod git;
pub mod remote;

pub use discovery::{find_files, list_csv_files};
pub use git::{clone_repo, delete_directory};
pub use remote::{fetch_to_temp_file, suggested_file_name, FetchedFile};
