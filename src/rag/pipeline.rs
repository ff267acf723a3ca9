//! Retrieval-augmented answers: embed the question, pull the closest
//! knowledge-base chunks, and let the chat model phrase a reply from them.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::embeddings::Embedder;
use crate::client::groq::{ChatModel, Message};
use crate::client::models::MatchedChunk;
use crate::error::{RagError, StoreError};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Leki, a motorcycle expert. Answer using ONLY the provided context. \
If the answer isn't there, say you don't know.";

pub const NO_CONTEXT_ANSWER: &str = "I'm sorry, I couldn't find any information about that in my knowledge base. \
Please try asking differently or contact support.";

/// Similarity search over stored chunk embeddings.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn match_chunks(&self, embedding: &[f32], threshold: f32, count: u32) -> Result<Vec<MatchedChunk>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub system_prompt: String,
    pub match_threshold: f32,
    pub match_count: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            match_threshold: 0.5,
            match_count: 5,
            temperature: 0.5,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<MatchedChunk>,
}

pub struct RagPipeline<'a> {
    embedder: &'a dyn Embedder,
    model: &'a dyn ChatModel,
    context: &'a dyn ContextSource,
    options: RagOptions,
}

impl<'a> RagPipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        model: &'a dyn ChatModel,
        context: &'a dyn ContextSource,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            model,
            context,
            options,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<MatchedChunk>, RagError> {
        let embedding = self.embedder.embed(query).await?;
        let matches = self
            .context
            .match_chunks(&embedding, self.options.match_threshold, self.options.match_count)
            .await?;
        debug!("Retrieved {} chunks for query", matches.len());
        Ok(matches)
    }

    pub fn build_messages(&self, query: &str, context: &[MatchedChunk]) -> Vec<Message> {
        let joined = context
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        vec![
            Message::system(self.options.system_prompt.clone()),
            Message::user(format!("Context:\n{joined}\n\nQuestion: {query}")),
        ]
    }

    /// Answers `query` from the knowledge base. With no matching context the
    /// model is not called and a fixed reply is returned.
    pub async fn answer(&self, query: &str) -> Result<ChatAnswer, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let sources = self.retrieve(query).await?;
        if sources.is_empty() {
            info!("No knowledge-base context matched; returning fallback answer");
            return Ok(ChatAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
            });
        }

        let messages = self.build_messages(query, &sources);
        let answer = self
            .model
            .complete(&messages, self.options.temperature, self.options.max_tokens)
            .await?;
        info!("Answered with {} ({} sources)", self.model.model(), sources.len());

        Ok(ChatAnswer { answer, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, LlmError};
    use std::sync::Mutex;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<Vec<Message>>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, messages: &[Message], _temperature: f32, _max_tokens: u32) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            if self.fail {
                return Err(LlmError::Api {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            Ok("Check the chain tension.".into())
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    struct FixedContext(Vec<MatchedChunk>);

    #[async_trait]
    impl ContextSource for FixedContext {
        async fn match_chunks(&self, _embedding: &[f32], _threshold: f32, count: u32) -> Result<Vec<MatchedChunk>, StoreError> {
            Ok(self.0.iter().take(count as usize).cloned().collect())
        }
    }

    fn chunk(content: &str) -> MatchedChunk {
        MatchedChunk {
            content: content.to_string(),
            similarity: Some(0.9),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn answers_from_retrieved_context() {
        let model = RecordingModel::default();
        let context = FixedContext(vec![chunk("Chains stretch."), chunk("Lube every 500 km.")]);
        let pipeline = RagPipeline::new(&UnitEmbedder, &model, &context, RagOptions::default());

        let answer = pipeline.answer("  chain noise?  ").await.unwrap();
        assert_eq!(answer.answer, "Check the chain tension.");
        assert_eq!(answer.sources.len(), 2);

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0][0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(
            seen[0][1].content,
            "Context:\nChains stretch.\n\nLube every 500 km.\n\nQuestion: chain noise?"
        );
    }

    #[tokio::test]
    async fn no_context_skips_the_model() {
        let model = RecordingModel::default();
        let context = FixedContext(Vec::new());
        let pipeline = RagPipeline::new(&UnitEmbedder, &model, &context, RagOptions::default());

        let answer = pipeline.answer("tyre pressure?").await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let model = RecordingModel::default();
        let context = FixedContext(vec![chunk("x")]);
        let pipeline = RagPipeline::new(&UnitEmbedder, &model, &context, RagOptions::default());

        assert!(matches!(pipeline.answer("   ").await, Err(RagError::EmptyQuery)));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = RecordingModel {
            fail: true,
            ..Default::default()
        };
        let context = FixedContext(vec![chunk("x")]);
        let pipeline = RagPipeline::new(&UnitEmbedder, &model, &context, RagOptions::default());

        assert!(matches!(pipeline.answer("hi").await, Err(RagError::Llm(_))));
    }

    #[tokio::test]
    async fn retrieval_respects_match_count() {
        let model = RecordingModel::default();
        let context = FixedContext(vec![chunk("a"), chunk("b"), chunk("c")]);
        let options = RagOptions {
            match_count: 2,
            ..Default::default()
        };
        let pipeline = RagPipeline::new(&UnitEmbedder, &model, &context, options);

        assert_eq!(pipeline.retrieve("q").await.unwrap().len(), 2);
    }
}
