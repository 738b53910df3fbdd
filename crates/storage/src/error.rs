use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("version conflict on {index}/{id}")]
    VersionConflict { index: String, id: String },

    #[error("store rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("{0}")]
    Other(String),
}
