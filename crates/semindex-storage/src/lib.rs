//! Persistence layer: the code-block store (C5), the metadata store (C7),
//! and a composite facade (C8) coordinating them with the vector store (C6).

pub mod block_store;
pub mod composite;
pub mod error;
pub mod metadata_store;

pub use block_store::{BlockBatchIter, BlockQuery, CodeBlockStore};
pub use composite::{CompositeStorage, PurgeSummary};
pub use error::{BlockStoreError, CompositeStorageError, MetadataStoreError};
pub use metadata_store::MetadataStore;
