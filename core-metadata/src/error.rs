use bridge_traits::error::BridgeError;
use core_library::error::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
