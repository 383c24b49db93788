use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum NearsightError {
    #[error("Image too small: {width}x{height} (minimum {min}x{min})")]
    ImageTooSmall { width: u32, height: u32, min: u32 },

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Search worker failed: {0}")]
    WorkerFailed(String),
}

pub type Result<T> = std::result::Result<T, NearsightError>;
