use shardkv::{ErrorKind, KvError};
use thiserror::Error;

/// Failures of the fjall image backend.
#[derive(Debug, Error)]
pub enum FjallImageError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),
    #[error("Failed to encode image record: {0}")]
    Encode(String),
    #[error("Failed to decode image record: {0}")]
    Decode(String),
    #[error("Key of {0} bytes exceeds the fjall key limit")]
    KeyTooLarge(usize),
    #[error("Image of store {0} is incomplete")]
    Incomplete(String),
}

impl From<FjallImageError> for KvError {
    fn from(err: FjallImageError) -> Self {
        let kind = match &err {
            FjallImageError::Decode(_) | FjallImageError::Incomplete(_) => {
                ErrorKind::FileCorrupted
            }
            _ => ErrorKind::Extension("fjall".to_string()),
        };
        KvError::new(&err.to_string(), kind)
    }
}
