//! Blob storage, audio conversion, and the call-store client.

mod callstore;
mod conversion;
mod s3;

pub use callstore::CallStoreClient;
pub use conversion::{convert_to_mp3, convert_to_wav};
pub use s3::{object_key, BlobStorage, S3Config};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload rejected: {0}")]
    Upload(String),
    #[error("audio conversion failed: {0}")]
    Conversion(String),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
