use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidParameters { chunk_size: usize, overlap: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode rows from {table}: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no exact count returned for {0}")]
    MissingCount(String),

    #[error("insert into {0} returned no rows")]
    EmptyInsert(String),

    #[error("invalid base URL: {0}")]
    Url(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Failures of the retrieval-augmented answer flow.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("message is required")]
    EmptyQuery,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("context lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Llm(#[from] LlmError),
}
