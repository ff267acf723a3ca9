//! Lead-scoring dashboard and knowledge-base chat for Leki.
//!
//! The `leki` binary is a thin CLI over these modules. [`chunk_text`] is the
//! entry point for splitting documents before they are embedded.

pub mod analytics;
pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod rag;
pub mod ui;

pub use rag::chunker::{ChunkParams, Chunker, chunk_text};
