//! Errors for the code-block store, metadata store, and composite facade.

use thiserror::Error;

/// Errors from the code-block store (C5).
#[derive(Error, Debug)]
pub enum BlockStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error on content blob: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize block payload: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the metadata store (C7).
#[derive(Error, Debug)]
pub enum MetadataStoreError {
    #[error("I/O error on metadata file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize metadata: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MetadataStoreError {
    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the composite storage facade (C8).
#[derive(Error, Debug)]
pub enum CompositeStorageError {
    #[error(transparent)]
    Block(#[from] BlockStoreError),

    #[error(transparent)]
    Metadata(#[from] MetadataStoreError),

    #[error(transparent)]
    Vector(#[from] semindex_search::VectorStoreError),
}
