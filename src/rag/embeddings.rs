use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmbeddingError;

/// Text-embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbeddingError::CountMismatch { expected: 1, actual }),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    /// Only the text-embedding-3 family can shorten its vectors.
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI `/embeddings` endpoint (text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimensions,
        })
    }

    fn request<'a>(&'a self, texts: &'a [&'a str]) -> EmbedRequest<'a> {
        EmbedRequest {
            model: &self.model,
            input: texts,
            dimensions: self.model.starts_with("text-embedding-3").then_some(self.dimensions),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(texts))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {body}")));
        }

        let resp: EmbedResponse = response.json().await?;
        order_and_validate(resp, texts.len(), self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn order_and_validate(
    mut resp: EmbedResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if resp.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: resp.data.len(),
        });
    }

    resp.data.sort_by_key(|item| item.index);

    if let Some(bad) = resp.data.iter().find(|item| item.embedding.len() != dimensions) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            actual: bad.embedding.len(),
        });
    }

    Ok(resp.data.into_iter().map(|item| item.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(items: Vec<(usize, Vec<f32>)>) -> EmbedResponse {
        EmbedResponse {
            data: items
                .into_iter()
                .map(|(index, embedding)| EmbedItem { embedding, index })
                .collect(),
        }
    }

    #[test]
    fn restores_input_order() {
        let resp = response(vec![(1, vec![0.0, 1.0]), (0, vec![1.0, 0.0])]);
        let vectors = order_and_validate(resp, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let resp = response(vec![(0, vec![1.0, 0.0, 0.0])]);
        let err = order_and_validate(resp, 1, 2).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn rejects_missing_vectors() {
        let resp = response(vec![(0, vec![1.0])]);
        let err = order_and_validate(resp, 3, 1).unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { expected: 3, actual: 1 }));
    }

    fn embedder(model: &str, dimensions: usize) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            "key".into(),
            model.into(),
            "https://api.openai.com/v1".into(),
            dimensions,
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn configured_dimensions_are_requested_from_v3_models() {
        let small = embedder("text-embedding-3-small", 512);
        let body = serde_json::to_value(small.request(&["chain"])).unwrap();
        assert_eq!(body["dimensions"], 512);
        assert_eq!(body["input"][0], "chain");

        let ada = embedder("text-embedding-ada-002", 1536);
        let body = serde_json::to_value(ada.request(&["chain"])).unwrap();
        assert!(body.get("dimensions").is_none());
    }

    struct Fixed;

    #[async_trait]
    impl Embedder for Fixed {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn single_embed_uses_batch() {
        assert_eq!(Fixed.embed("abcd").await.unwrap(), vec![4.0]);
    }
}
