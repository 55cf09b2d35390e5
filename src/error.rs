use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("No usable text could be extracted from the document")]
    NoContent,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Inference service error: {0}")]
    Inference(String),

    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "groq")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<csv::Error> for ReconcileError {
    fn from(err: csv::Error) -> Self {
        ReconcileError::Export(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
