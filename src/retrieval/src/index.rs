use crate::embed::Embedder;
use crate::store::{PassageSource, PassageStore};
use crate::RetrievalError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Unit-norm vectors, one per passage, in passage order.
///
/// Because every vector is normalized, inner product equals cosine
/// similarity.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Build from precomputed vectors, checking uniform dimension, finite
    /// components and unit norm (zero vectors are tolerated and never match
    /// anything).
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self, RetrievalError> {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);

        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dim {
                return Err(RetrievalError::Index(format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    v.len(),
                    dim
                )));
            }
            if !is_finite(v) {
                return Err(RetrievalError::Index(format!(
                    "vector {} has a non-finite component",
                    i
                )));
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 && (norm - 1.0).abs() > 1e-3 {
                return Err(RetrievalError::Index(format!(
                    "vector {} is not normalized (norm {:.4})",
                    i, norm
                )));
            }
        }

        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Indices and scores of the `k` most similar vectors, best first.
    /// Equal scores keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, inner_product(query, v)))
            .collect();

        // Stable sort keeps passage order among ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.vectors.len()));
        scored
    }
}

fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A retrieved passage with its similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub text: String,
    pub source: PassageSource,
    pub score: f32,
}

/// Nearest-passage lookup over an immutable store and index.
pub struct Retriever {
    store: PassageStore,
    index: EmbeddingIndex,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// Embed every passage once and build the index.
    pub async fn build(
        store: PassageStore,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let texts: Vec<String> = store.passages().iter().map(|p| p.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != store.len() {
            return Err(RetrievalError::Index(format!(
                "{} passages but {} vectors",
                store.len(),
                vectors.len()
            )));
        }

        let index = EmbeddingIndex::from_vectors(vectors)?;
        info!(
            passages = store.len(),
            dim = index.dim(),
            embedder = embedder.name(),
            "built embedding index"
        );

        Ok(Self {
            store,
            index,
            embedder,
        })
    }

    /// The `top_k` passages nearest to `text`, by descending similarity.
    /// Asking for more passages than exist returns all of them.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredPassage>, RetrievalError> {
        if self.store.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(text).await?;
        if query.len() != self.index.dim() {
            return Err(RetrievalError::Index(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.index.dim()
            )));
        }
        if !is_finite(&query) {
            return Err(RetrievalError::Index(
                "query vector has a non-finite component".to_string(),
            ));
        }

        let hits: Vec<ScoredPassage> = self
            .index
            .search(&query, top_k)
            .into_iter()
            .filter_map(|(idx, score)| {
                self.store.get(idx).map(|p| ScoredPassage {
                    text: p.text.clone(),
                    source: p.source,
                    score,
                })
            })
            .collect();

        debug!(
            top_k,
            returned = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved passages"
        );
        Ok(hits)
    }

    pub fn store(&self) -> &PassageStore {
        &self.store
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashedEmbedder;
    use crate::store::Exemplar;
    use async_trait::async_trait;

    fn exemplar(text: &str) -> Exemplar {
        Exemplar {
            text: text.to_string(),
            label: None,
        }
    }

    fn store() -> PassageStore {
        PassageStore::build(
            "Advertisements include links, promo codes and discounts.\n\n\
             Rants without visit come from people who never went there.\n\n\
             Irrelevant content talks about unrelated topics.",
            &[
                exemplar("Best pizza in town, friendly staff"),
                exemplar("Use promo code PIZZA for a discount at our site"),
            ],
        )
    }

    async fn retriever() -> Retriever {
        Retriever::build(store(), Arc::new(HashedEmbedder::default()))
            .await
            .unwrap()
    }

    /// Maps every text to the same unit vector so every score ties.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    #[tokio::test]
    async fn test_index_size_matches_passages() {
        let r = retriever().await;
        assert_eq!(r.index().len(), r.store().len());
        assert_eq!(r.index().dim(), 384);
    }

    #[tokio::test]
    async fn test_query_returns_at_most_top_k_ordered() {
        let r = retriever().await;
        let hits = r.query("promo code discount", 3).await.unwrap();

        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score, "scores must not increase");
        }
        for hit in &hits {
            assert!(r.store().passages().iter().any(|p| p.text == hit.text));
        }
        assert!(hits[0].text.contains("promo code"));
    }

    #[tokio::test]
    async fn test_top_k_larger_than_store_returns_all() {
        let r = retriever().await;
        let hits = r.query("anything", 50).await.unwrap();
        assert_eq!(hits.len(), r.store().len());
    }

    #[tokio::test]
    async fn test_ties_keep_passage_order() {
        let r = Retriever::build(store(), Arc::new(ConstantEmbedder))
            .await
            .unwrap();
        let hits = r.query("whatever", 5).await.unwrap();
        let expected: Vec<&str> = r.store().passages().iter().map(|p| p.text.as_str()).collect();
        let got: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let r = Retriever::build(PassageStore::default(), Arc::new(HashedEmbedder::default()))
            .await
            .unwrap();
        assert!(r.query("hello", 3).await.unwrap().is_empty());
    }

    #[test]
    fn test_index_rejects_mixed_dimensions() {
        let err = EmbeddingIndex::from_vectors(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, RetrievalError::Index(_)));
    }

    #[test]
    fn test_index_rejects_unnormalized_vectors() {
        let err = EmbeddingIndex::from_vectors(vec![vec![3.0, 4.0]]).unwrap_err();
        assert!(matches!(err, RetrievalError::Index(_)));
    }

    #[test]
    fn test_index_rejects_non_finite_vectors() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = EmbeddingIndex::from_vectors(vec![vec![bad, 0.0], vec![1.0, 0.0]]).unwrap_err();
            assert!(matches!(err, RetrievalError::Index(_)));
        }
        let index = EmbeddingIndex::from_vectors(vec![vec![0.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits, vec![(1, 1.0), (0, 0.0)]);
    }

    /// Unit vectors for passages, NaN for anything mentioning "overflow".
    struct OverflowingEmbedder;

    #[async_trait]
    impl Embedder for OverflowingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("overflow") {
                        vec![f32::NAN, 0.0]
                    } else {
                        vec![1.0, 0.0]
                    }
                })
                .collect())
        }

        fn name(&self) -> &str {
            "overflowing"
        }
    }

    #[tokio::test]
    async fn test_query_rejects_non_finite_query_vector() {
        let r = Retriever::build(store(), Arc::new(OverflowingEmbedder))
            .await
            .unwrap();
        let err = r.query("overflow", 2).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Index(_)));
        assert_eq!(r.query("fine", 2).await.unwrap().len(), 2);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = EmbeddingIndex::from_vectors(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.6, 0.8],
        ])
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 2]);
    }
}
