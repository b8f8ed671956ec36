use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("grammar failed to load: {0}")]
    Grammar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("chunking failed: {0}")]
    Chunking(String),

    #[error("refinement failed: {0}")]
    Refinement(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension {actual} does not match target dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("collection not found: {0}")]
    MissingCollection(String),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
