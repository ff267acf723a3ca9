pub mod chunker;
pub mod embeddings;
pub mod pipeline;
pub mod store;
pub mod walker;
