//! Errors for repository fetching and code chunking.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the repository fetcher (C1).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("archive extraction failed: {0}")]
    Archive(String),

    #[error("local path does not exist: {0}")]
    LocalPathNotFound(PathBuf),

    #[error("invalid revision '{revision}' for repository {url}")]
    InvalidRevision { url: String, revision: String },

    #[error("authentication failed for {url}")]
    AuthenticationFailed { url: String },
}

impl FetchError {
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    pub fn invalid_revision(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::InvalidRevision {
            url: url.into(),
            revision: revision.into(),
        }
    }

    pub fn authentication_failed(url: impl Into<String>) -> Self {
        Self::AuthenticationFailed { url: url.into() }
    }
}

/// Errors from the code chunker (C2).
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("file {path} exceeds the configured size limit ({size} > {limit} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("unsupported language for {0}")]
    UnsupportedLanguage(PathBuf),
}

impl ChunkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_messages_are_descriptive() {
        let err = FetchError::invalid_revision("https://example.com/repo.git", "deadbeef");
        assert!(err.to_string().contains("deadbeef"));
        let err = FetchError::authentication_failed("https://example.com/repo.git");
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn chunk_error_carries_path() {
        let err = ChunkError::parse("src/lib.rs", "unexpected token");
        assert!(err.to_string().contains("src/lib.rs"));
        assert!(err.to_string().contains("unexpected token"));
    }
}
