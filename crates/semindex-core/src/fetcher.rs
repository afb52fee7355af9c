//! Repository Fetcher (C1): acquires a local, readable source tree from a
//! git remote, a local path, or an archive.

use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FetchError;

/// Declares where a repository's source comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchConfig {
    Git {
        url: String,
        branch: Option<String>,
        commit: Option<String>,
        auth_token: Option<String>,
    },
    Local {
        path: PathBuf,
    },
    Archive {
        path: PathBuf,
    },
}

/// RAII guard over a fetched working directory.
///
/// `Drop` removes the directory when it was created by the fetcher (not a
/// user-supplied local path) and the guard is dropped before `disarm` is
/// called — the "scoped acquisition, guaranteed release" pattern: cancelling
/// or erroring out of an in-progress fetch never leaks a temp checkout.
pub struct WorkingTree {
    path: PathBuf,
    owned: bool,
    cleanup_on_error: bool,
    succeeded: bool,
}

impl WorkingTree {
    fn owned(path: PathBuf, cleanup_on_error: bool) -> Self {
        Self {
            path,
            owned: true,
            cleanup_on_error,
            succeeded: false,
        }
    }

    fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            owned: false,
            cleanup_on_error: false,
            succeeded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Marks the fetch as successful: the directory survives the guard's drop
    /// regardless of `cleanup_on_error`.
    pub fn disarm(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for WorkingTree {
    fn drop(&mut self) {
        if self.owned && !self.succeeded && self.cleanup_on_error && self.path.exists() {
            if let Err(err) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %err, "failed to clean up working tree");
            }
        }
    }
}

/// Fetches a repository's source tree per a [`FetchConfig`].
pub struct Fetcher {
    work_root: PathBuf,
    cleanup_on_error: bool,
}

impl Fetcher {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            cleanup_on_error: true,
        }
    }

    pub fn with_cleanup_on_error(mut self, cleanup: bool) -> Self {
        self.cleanup_on_error = cleanup;
        self
    }

    /// Acquires a local, readable source tree for `config`.
    ///
    /// On success the returned [`WorkingTree`] is disarmed: its `Drop` is a
    /// no-op. On error, if `cleanup_on_error` is set and the tree was created
    /// by this fetcher, the partial checkout is removed before the error
    /// propagates.
    pub fn fetch(&self, config: &FetchConfig) -> Result<WorkingTree, FetchError> {
        let mut tree = match config {
            FetchConfig::Git {
                url,
                branch,
                commit,
                auth_token,
            } => self.fetch_git(url, branch.as_deref(), commit.as_deref(), auth_token.as_deref()),
            FetchConfig::Local { path } => self.fetch_local(path),
            FetchConfig::Archive { path } => self.fetch_archive(path),
        };

        if let Ok(wt) = &mut tree {
            wt.disarm();
        }
        tree
    }

    fn fetch_git(
        &self,
        url: &str,
        branch: Option<&str>,
        commit: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<WorkingTree, FetchError> {
        let dest = self.work_root.join(repo_slug(url));
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        fs::create_dir_all(&dest)?;
        let tree = WorkingTree::owned(dest.clone(), self.cleanup_on_error);

        let mut builder = git2::build::RepoBuilder::new();
        if let Some(branch) = branch {
            builder.branch(branch);
        }
        if let Some(token) = auth_token {
            let mut callbacks = git2::RemoteCallbacks::new();
            let token = token.to_string();
            callbacks.credentials(move |_url, _username, _allowed| {
                git2::Cred::userpass_plaintext(&token, "")
            });
            let mut fetch_options = git2::FetchOptions::new();
            fetch_options.remote_callbacks(callbacks);
            builder.fetch_options(fetch_options);
        }

        debug!(url, dest = %dest.display(), "cloning repository");
        let repo = builder.clone(url, &dest).map_err(|err| {
            if err.class() == git2::ErrorClass::Http || err.class() == git2::ErrorClass::Net {
                FetchError::authentication_failed(url)
            } else {
                FetchError::from(err)
            }
        })?;

        if let Some(commit) = commit {
            let oid = git2::Oid::from_str(commit)
                .map_err(|_| FetchError::invalid_revision(url, commit))?;
            let object = repo
                .find_object(oid, None)
                .map_err(|_| FetchError::invalid_revision(url, commit))?;
            repo.checkout_tree(&object, None)?;
            repo.set_head_detached(oid)?;
        }

        info!(url, dest = %dest.display(), "fetched git repository");
        Ok(tree)
    }

    fn fetch_local(&self, path: &Path) -> Result<WorkingTree, FetchError> {
        if !path.exists() {
            return Err(FetchError::LocalPathNotFound(path.to_path_buf()));
        }
        Ok(WorkingTree::borrowed(path.to_path_buf()))
    }

    fn fetch_archive(&self, path: &Path) -> Result<WorkingTree, FetchError> {
        if !path.exists() {
            return Err(FetchError::LocalPathNotFound(path.to_path_buf()));
        }
        let dest = self.work_root.join(archive_slug(path));
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        fs::create_dir_all(&dest)?;
        let tree = WorkingTree::owned(dest.clone(), self.cleanup_on_error);

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "zip" => extract_zip(path, &dest)?,
            "gz" | "tgz" => extract_tar_gz(path, &dest)?,
            other => return Err(FetchError::archive(format!("unsupported archive type: {other}"))),
        }

        info!(path = %path.display(), dest = %dest.display(), "extracted archive");
        Ok(tree)
    }
}

fn extract_zip(path: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| FetchError::archive(err.to_string()))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::archive(err.to_string()))?;
        let Some(out_path) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(out_path);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            fs::write(&out_path, contents)?;
        }
    }
    Ok(())
}

fn extract_tar_gz(path: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|err| FetchError::archive(err.to_string()))?;
    Ok(())
}

fn repo_slug(url: &str) -> String {
    url.rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}

fn archive_slug(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fetch_local_borrows_existing_path() {
        let dir = tempdir().unwrap();
        let fetcher = Fetcher::new(dir.path().join("work"));
        let tree = fetcher
            .fetch(&FetchConfig::Local {
                path: dir.path().to_path_buf(),
            })
            .unwrap();
        assert_eq!(tree.path(), dir.path());
    }

    #[test]
    fn fetch_local_missing_path_errors() {
        let dir = tempdir().unwrap();
        let fetcher = Fetcher::new(dir.path().join("work"));
        let result = fetcher.fetch(&FetchConfig::Local {
            path: dir.path().join("does-not-exist"),
        });
        assert!(matches!(result, Err(FetchError::LocalPathNotFound(_))));
    }

    #[test]
    fn working_tree_drop_removes_owned_unarmed_directory() {
        let dir = tempdir().unwrap();
        let owned_path = dir.path().join("owned");
        fs::create_dir_all(&owned_path).unwrap();
        {
            let _tree = WorkingTree::owned(owned_path.clone(), true);
            // dropped without calling disarm()
        }
        assert!(!owned_path.exists());
    }

    #[test]
    fn working_tree_drop_keeps_disarmed_directory() {
        let dir = tempdir().unwrap();
        let owned_path = dir.path().join("owned");
        fs::create_dir_all(&owned_path).unwrap();
        {
            let mut tree = WorkingTree::owned(owned_path.clone(), true);
            tree.disarm();
        }
        assert!(owned_path.exists());
    }
}
