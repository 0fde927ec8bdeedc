use crate::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Text embedding backend.
///
/// Implementations must be deterministic for a given input and return one
/// vector per text, all of the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no vector".to_string()))
    }

    /// Identifier used in logs
    fn name(&self) -> &str;
}

/// Token-hashing bag-of-words embedding.
///
/// Lower-cases, splits on non-alphanumerics, hashes each token (FNV-1a) into
/// one of `dim` buckets and L2-normalizes. Fully offline; lexical overlap is
/// the only notion of similarity it has.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dim as u64) as usize] += 1.0;
        }

        normalize(&mut v);
        v
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashed"
    }
}

/// Embeddings from a local Ollama server (`/api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// `base_url` should be like `http://localhost:11434` (no trailing slash).
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        debug!(url = %url, model = %self.model, count = texts.len(), "requesting embeddings");

        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = resp.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        // Normalize client-side so inner product is cosine regardless of model.
        Ok(parsed
            .embeddings
            .into_iter()
            .map(|mut v| {
                normalize(&mut v);
                v
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashed_embedding_is_unit_norm() {
        let embedder = HashedEmbedder::new(64);
        let v = embedder.embed("Best pizza in town").await.unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[tokio::test]
    async fn test_hashed_embedding_is_deterministic_and_case_insensitive() {
        let embedder = HashedEmbedder::default();
        let a = embedder.embed("Great Service").await.unwrap();
        let b = embedder.embed("great service!").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashed_overlap_scores_higher() {
        let embedder = HashedEmbedder::default();
        let query = embedder.embed("promo code discount").await.unwrap();
        let ad = embedder.embed("use promo code for a discount").await.unwrap();
        let food = embedder.embed("the lasagna was delicious").await.unwrap();
        assert!(dot(&query, &ad) > dot(&query, &food));
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashedEmbedder::new(16);
        let v = embedder.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_minimum_dimension() {
        assert_eq!(HashedEmbedder::new(2).dim(), 8);
    }

    #[test]
    fn test_ollama_embedder_trims_trailing_slash() {
        let embedder =
            OllamaEmbedder::new("http://localhost:11434/", "all-minilm", Duration::from_secs(5))
                .unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.model(), "all-minilm");
    }
}
