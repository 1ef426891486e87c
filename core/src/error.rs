use thiserror::Error;

pub type QuillResult<T> = Result<T, QuillError>;

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
