use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot error: {collection}: {reason}")]
    Snapshot { collection: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl Error {
    /// Snapshot failure for a specific collection.
    pub fn snapshot(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Snapshot {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
