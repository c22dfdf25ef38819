//! Git retrieval - shallow clones of remote repositories

use crate::error::{IngestError, Result};
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Repository name taken from the clone URL, e.g. `datasets` for
/// `https://github.com/acme/datasets.git`
pub fn repo_name(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit(&['/', ':'][..])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

/// Shallow (depth 1) clone of `url` into a fresh temporary directory.
///
/// With `branch`, only that branch is fetched and checked out; otherwise the
/// remote's default branch is used. Remove the result with
/// [`delete_directory`] once done.
pub fn clone_repo(url: &str, branch: Option<&str>) -> Result<PathBuf> {
    let target = std::env::temp_dir().join(format!(
        "csv-to-db-{}-{}",
        repo_name(url),
        Uuid::new_v4().simple()
    ));

    let mut callbacks = RemoteCallbacks::new();
    callbacks.sideband_progress(|data| {
        let message = String::from_utf8_lossy(data);
        let message = message.trim();
        if !message.is_empty() {
            info!("{}", message);
        }
        true
    });

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    fetch.depth(1);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch);
    if let Some(branch) = branch {
        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
        builder.branch(branch);
        builder.remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));
    }

    info!("Cloning {} into {}", url, target.display());
    if let Err(e) = builder.clone(url, &target) {
        if target.exists() {
            let _ = std::fs::remove_dir_all(&target);
        }
        return Err(IngestError::retrieval(url, e.message()));
    }
    Ok(target)
}

/// Recursively delete a directory produced by [`clone_repo`]
pub fn delete_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::remove_dir_all(path)?;
    debug!("Removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://github.com/acme/datasets.git"), "datasets");
        assert_eq!(repo_name("https://github.com/acme/datasets/"), "datasets");
        assert_eq!(repo_name("git@github.com:acme.git"), "acme");
        assert_eq!(repo_name(""), "repo");
    }

    #[test]
    fn test_delete_directory() {
        let dir = TempDir::new().unwrap();
        let clone = dir.path().join("clone");
        std::fs::create_dir_all(clone.join("nested")).unwrap();
        std::fs::write(clone.join("nested/a.csv"), "a\n").unwrap();

        delete_directory(&clone).unwrap();
        assert!(!clone.exists());
        assert!(delete_directory(&clone).is_err());
    }

    #[test]
    fn test_clone_of_missing_repo_is_retrieval_failure() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().join("not-a-repo");
        let result = clone_repo(&url.to_string_lossy(), None);
        assert!(matches!(result, Err(IngestError::RetrievalFailure { .. })));
    }
}
