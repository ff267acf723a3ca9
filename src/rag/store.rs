use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::chunker::{Chunk, Chunker};
use super::embeddings::Embedder;
use super::pipeline::ContextSource;
use crate::client::models::{
    IdRow, KbChunk, KbDocument, MatchedChunk, NewKbChunk, NewKbDocument, PendingChunk, SourceType,
};
use crate::client::rest::SupabaseClient;
use crate::error::StoreError;

const DOCUMENTS: &str = "kb_documents";
const CHUNKS: &str = "kb_chunks";

/// Document that collects snippets added one at a time.
pub const DASHBOARD_UPLOADS_TITLE: &str = "Dashboard Uploads";

/// OpenAI accepts large batches, but one failure should not cost too much work.
const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub text: String,
    pub source_url: Option<String>,
    pub source_type: SourceType,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub document: KbDocument,
    pub chunks_inserted: usize,
    pub embedded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct KbStats {
    pub total_documents: u64,
    pub enabled_documents: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    pub succeeded: usize,
    pub failed: Vec<(String, String)>,
}

/// Knowledge-base documents and their chunks.
pub struct KnowledgeBase<'a> {
    db: &'a SupabaseClient,
}

impl<'a> KnowledgeBase<'a> {
    pub fn new(db: &'a SupabaseClient) -> Self {
        Self { db }
    }

    pub async fn create_document(&self, doc: &NewKbDocument) -> Result<KbDocument, StoreError> {
        let rows: Vec<KbDocument> = self.db.table(DOCUMENTS).insert(doc).await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::EmptyInsert(DOCUMENTS.to_string()))?;
        info!("Inserted kb_document with id={}", created.id);
        Ok(created)
    }

    /// Newest first; disabled documents only when asked for.
    pub async fn list_documents(&self, limit: usize, include_disabled: bool) -> Result<Vec<KbDocument>, StoreError> {
        let mut query = self.db.table(DOCUMENTS).order("created_at", true).limit(limit);
        if !include_disabled {
            query = query.eq("enabled", true);
        }
        let docs: Vec<KbDocument> = query.execute().await?;
        info!("Fetched {} kb_documents (include_disabled={})", docs.len(), include_disabled);
        Ok(docs)
    }

    pub async fn document_with_chunks(&self, id: &str) -> Result<Option<(KbDocument, Vec<KbChunk>)>, StoreError> {
        let docs: Vec<KbDocument> = self.db.table(DOCUMENTS).eq("id", id).limit(1).execute().await?;
        let Some(doc) = docs.into_iter().next() else {
            return Ok(None);
        };

        let chunks: Vec<KbChunk> = self
            .db
            .table(CHUNKS)
            .select("id,document_id,chunk_index,content,metadata,created_at")
            .eq("document_id", id)
            .order("chunk_index", false)
            .fetch_all(500)
            .await?;
        Ok(Some((doc, chunks)))
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
        self.db
            .table(DOCUMENTS)
            .eq("id", id)
            .update(&json!({ "enabled": enabled, "updated_at": Utc::now() }))
            .await?;
        info!("Set kb_document id={} enabled={}", id, enabled);
        Ok(())
    }

    /// Chunks go with the document (ON DELETE CASCADE).
    pub async fn delete_document(&self, id: &str) -> Result<(), StoreError> {
        self.db.table(DOCUMENTS).eq("id", id).delete().await?;
        info!("Deleted kb_document id={}", id);
        Ok(())
    }

    pub async fn insert_chunks(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let rows = chunk_rows(document_id, chunks, embeddings)?;
        let _: Vec<IdRow> = self.db.table(CHUNKS).select("id").insert(&rows).await?;
        info!("Inserted {} chunks for document {}", rows.len(), document_id);
        Ok(rows.len())
    }

    /// Creates a document from pasted or file text and stores its chunks.
    ///
    /// Chunks are embedded before anything is written. If storing the chunks
    /// fails, the new document is deleted again, so no empty document is left.
    pub async fn ingest_text(
        &self,
        request: IngestRequest,
        chunker: &Chunker,
        embedder: Option<&dyn Embedder>,
    ) -> Result<IngestReport> {
        let title = request.title.trim();
        if title.is_empty() {
            bail!("Title is required to create a document.");
        }
        if request.text.trim().is_empty() {
            bail!("Please paste some knowledge text to ingest.");
        }
        let chunks = chunker.chunks(&request.text);

        let embeddings = match embedder {
            Some(embedder) if !chunks.is_empty() => Some(embed_chunks(embedder, &chunks).await?),
            _ => None,
        };
        let embedded = embeddings.is_some();

        let mut doc = NewKbDocument::new(title);
        doc.source_url = request.source_url.filter(|u| !u.trim().is_empty());
        doc.source_type = request.source_type;
        doc.enabled = request.enabled;

        let document = self.create_document(&doc).await.context("creating kb_document")?;
        let chunks_inserted = match self.insert_chunks(&document.id, &chunks, embeddings).await {
            Ok(inserted) => inserted,
            Err(e) => {
                if let Err(cleanup) = self.delete_document(&document.id).await {
                    warn!("Could not remove kb_document {} after failed chunk insert: {}", document.id, cleanup);
                }
                return Err(anyhow::Error::new(e).context(format!("storing chunks for '{}'", document.title)));
            }
        };

        Ok(IngestReport {
            document,
            chunks_inserted,
            embedded,
        })
    }

    /// Appends one embedded chunk to the shared uploads document.
    pub async fn add_snippet(&self, content: &str, embedder: &dyn Embedder) -> Result<String> {
        let content = content.trim();
        if content.is_empty() {
            bail!("Content is required");
        }
        let embedding = embedder.embed(content).await.context("embedding snippet")?;

        let existing: Vec<IdRow> = self
            .db
            .table(DOCUMENTS)
            .select("id")
            .eq("title", DASHBOARD_UPLOADS_TITLE)
            .limit(1)
            .execute()
            .await?;
        let document_id = match existing.into_iter().next() {
            Some(row) => row.id,
            None => {
                let mut doc = NewKbDocument::new(DASHBOARD_UPLOADS_TITLE);
                doc.source_type = SourceType::Admin;
                self.create_document(&doc).await?.id
            }
        };

        // Snippets are unrelated to each other, so each one is index 0.
        let chunk = Chunk {
            index: 0,
            content: content.to_string(),
        };
        self.insert_chunks(&document_id, &[chunk], Some(vec![embedding]))
            .await?;
        Ok(document_id)
    }

    pub async fn stats(&self) -> Result<KbStats, StoreError> {
        let all = self.db.table(DOCUMENTS).select("id");
        let enabled = self.db.table(DOCUMENTS).select("id").eq("enabled", true);
        let chunks = self.db.table(CHUNKS).select("id");

        let (total_documents, enabled_documents, total_chunks) =
            tokio::try_join!(all.count(), enabled.count(), chunks.count())?;

        Ok(KbStats {
            total_documents,
            enabled_documents,
            total_chunks,
        })
    }

    /// Embeds up to `batch` chunks that were stored without a vector.
    /// Individual failures are collected and the rest still proceed.
    pub async fn backfill_embeddings(&self, embedder: &dyn Embedder, batch: usize) -> Result<BackfillReport, StoreError> {
        let pending: Vec<PendingChunk> = self
            .db
            .table(CHUNKS)
            .select("id,content")
            .is_null("embedding")
            .limit(batch)
            .execute()
            .await?;

        let mut report = BackfillReport::default();
        if pending.is_empty() {
            info!("All chunks already have embeddings");
            return Ok(report);
        }
        info!("Found {} chunks to embed", pending.len());

        for chunk in pending {
            let result = match embedder.embed(&chunk.content).await {
                Ok(embedding) => self
                    .db
                    .table(CHUNKS)
                    .eq("id", &chunk.id)
                    .update(&json!({ "embedding": embedding }))
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(()) => report.succeeded += 1,
                Err(message) => {
                    warn!("Embedding chunk {} failed: {}", chunk.id, message);
                    report.failed.push((chunk.id, message));
                }
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl ContextSource for KnowledgeBase<'_> {
    async fn match_chunks(&self, embedding: &[f32], threshold: f32, count: u32) -> Result<Vec<MatchedChunk>, StoreError> {
        self.db
            .rpc(
                "match_kb_chunks",
                &json!({
                    "query_embedding": embedding,
                    "match_threshold": threshold,
                    "match_count": count,
                }),
            )
            .await
    }
}

async fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    debug!("Embedding {} chunks ({} dimensions)", chunks.len(), embedder.dimensions());
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        vectors.extend(embedder.embed_batch(&texts).await.context("embedding chunks")?);
    }
    Ok(vectors)
}

fn chunk_rows(
    document_id: &str,
    chunks: &[Chunk],
    embeddings: Option<Vec<Vec<f32>>>,
) -> Result<Vec<NewKbChunk>, StoreError> {
    let mut embeddings = match embeddings {
        Some(vectors) if vectors.len() != chunks.len() => {
            return Err(StoreError::Invalid(format!(
                "{} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        Some(vectors) => vectors.into_iter().map(Some).collect(),
        None => vec![None; chunks.len()],
    };

    Ok(chunks
        .iter()
        .zip(embeddings.drain(..))
        .map(|(chunk, embedding)| NewKbChunk {
            document_id: document_id.to_string(),
            chunk_index: chunk.index as i64,
            content: chunk.content.clone(),
            metadata: json!({}),
            embedding,
        })
        .collect())
}
