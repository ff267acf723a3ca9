use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::analytics::segments::LeadSegment;
use crate::client::models::SourceType;

/// Leki Command Center: lead-scoring dashboard and knowledge-base chat.
#[derive(Debug, Parser)]
#[command(name = "leki", version, about)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Headline metrics, stage distribution, top actions, funnel and trends
    Dashboard {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Converted leads in one segment, with their page paths
    Leads {
        #[arg(long, value_enum, default_value_t = LeadSegment::HighValue)]
        segment: LeadSegment,
    },

    /// Manage knowledge-base documents
    Kb {
        #[command(subcommand)]
        action: KbCommand,
    },

    /// Ingest every text file under a path, one document per file
    Ingest {
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = SourceType::Other)]
        source_type: SourceType,

        /// Store the documents disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Embed chunks stored without an embedding
    Backfill {
        #[arg(long, default_value_t = 100)]
        batch: usize,
    },

    /// Split a file into chunks locally (no credentials needed)
    Chunk {
        file: PathBuf,

        /// Characters per chunk (default: configured chunk_size)
        #[arg(long)]
        size: Option<usize>,

        /// Characters shared between neighbours (default: configured chunk_overlap)
        #[arg(long)]
        overlap: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Interactive chat over the knowledge base
    Chat,

    /// Answer one question from the knowledge base
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,

        /// Print the answer and its sources as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and connectivity
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum KbCommand {
    /// List documents, newest first
    List {
        /// Include disabled documents
        #[arg(long)]
        all: bool,

        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Show one document and its chunks
    Show { id: String },

    /// Create a document from pasted text or a file
    Add {
        #[arg(long)]
        title: String,

        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        file: Option<PathBuf>,

        #[arg(long)]
        text: Option<String>,

        #[arg(long)]
        source_url: Option<String>,

        #[arg(long, value_enum, default_value_t = SourceType::Other)]
        source_type: SourceType,

        #[arg(long)]
        disabled: bool,
    },

    /// Append one embedded snippet to the "Dashboard Uploads" document
    Snippet {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    Enable { id: String },

    Disable { id: String },

    /// Delete a document and its chunks
    Delete { id: String },

    /// Document and chunk counts
    Stats,
}
