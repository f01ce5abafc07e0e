pub mod document;
pub mod store;

pub use document::*;
pub use store::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Deserialization error in {path}: {source}")]
    Deserialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to replace document: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
