use anyhow::{Result, anyhow};
use config::{Config, ConfigError, Environment, File};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::rag::chunker::{ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub supabase_url: String,
    pub supabase_key: String,
    // Writes prefer the service role key when it is set.
    pub supabase_service_role_key: Option<String>,

    pub groq_api_key: String,
    pub groq_base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    pub match_threshold: f32,
    pub match_count: u32,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_on_ingest: bool,

    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv().ok();

        let mut builder = Config::builder()
            .set_default("supabase_url", "")?
            .set_default("supabase_key", "")?
            .set_default("supabase_service_role_key", None::<String>)?
            .set_default("groq_api_key", "")?
            .set_default("groq_base_url", "https://api.groq.com/openai/v1")?
            .set_default("chat_model", "llama-3.3-70b-versatile")?
            .set_default("temperature", 0.5)?
            .set_default("max_tokens", 1024)?
            .set_default("system_prompt", None::<String>)?
            .set_default("openai_api_key", "")?
            .set_default("openai_base_url", "https://api.openai.com/v1")?
            .set_default("embedding_model", "text-embedding-3-small")?
            .set_default("embedding_dimensions", 1536)?
            .set_default("match_threshold", 0.5)?
            .set_default("match_count", 5)?
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE as u64)?
            .set_default("chunk_overlap", DEFAULT_OVERLAP as u64)?
            .set_default("embed_on_ingest", true)?
            .set_default("request_timeout_secs", 60)?
            .set_default("log_level", "info")?;

        if let Some(dir) = dirs::config_dir() {
            let path = dir.join("leki").join("leki");
            builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(false));
        }

        // SUPABASE_URL, GROQ_API_KEY, CHUNK_SIZE... map straight onto field names.
        let config = builder
            .add_source(File::with_name("leki").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    /// Key used for inserts, updates and deletes.
    pub fn write_key(&self) -> &str {
        self.supabase_service_role_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(&self.supabase_key)
    }

    pub fn chunk_params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(self.chunk_size, self.chunk_overlap)?)
    }

    /// Fails with the environment variable name when `value` is blank.
    pub fn require<'a>(value: &'a str, var_name: &str) -> Result<&'a str> {
        if value.trim().is_empty() {
            return Err(anyhow!("Missing required environment variable: {}", var_name));
        }
        Ok(value)
    }
}
