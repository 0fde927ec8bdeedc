//! Passage Retrieval - Policy clauses and labeled exemplars as prompt context
//!
//! A [`PassageStore`] is built once from two static assets (a policy document
//! and an exemplar collection), embedded into an [`EmbeddingIndex`], and
//! queried through a [`Retriever`] for the passages nearest to a review.
//! Everything here is read-only after construction.

mod embed;
mod index;
mod store;

pub use embed::{normalize, Embedder, HashedEmbedder, OllamaEmbedder};
pub use index::{EmbeddingIndex, Retriever, ScoredPassage};
pub use store::{Exemplar, Passage, PassageSource, PassageStore};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to load asset {path}: {reason}")]
    AssetLoad { path: PathBuf, reason: String },

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index invariant violated: {0}")]
    Index(String),
}
