pub mod text;
pub mod geometry;
pub mod classify;
pub mod fusion;
pub mod source;
pub mod processor; // Per-column stage driver over the record table
pub mod save;

use std::path::PathBuf;

use thiserror::Error;

pub use classify::ClassifierError;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("Missing required column '{column}': run the stage that produces it first")]
    MissingDependency { column: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Classifier invoked before a model was loaded")]
    ModelNotLoaded,

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    #[error("Failed to write image {path}: {reason}")]
    ImageEncode { path: PathBuf, reason: String },

    #[error("No such directory: {0} (consider enabling create_dirs)")]
    DestinationMissing(PathBuf),

    #[error("Record table error: {0}")]
    Records(String),
}

impl QcError {
    pub fn missing(column: &'static str) -> Self {
        QcError::MissingDependency { column }
    }
}
