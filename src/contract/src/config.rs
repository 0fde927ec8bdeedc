// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Classifier configuration (JSON)

use crate::vote::TieBreak;
use crate::ContractError;
use model_ensemble::{DecodingOptions, DEFAULT_MODELS};
use review_oracle::{default_rules, LabelSet, PreFilter, PrefilterRule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Everything needed to construct a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ensemble members, in vote order
    pub models: Vec<String>,
    pub labels: LabelSet,
    pub top_k: usize,
    pub decoding: DecodingOptions,
    pub ollama_url: String,
    /// Per model call; a call that exceeds it votes `unknown`
    pub request_timeout_secs: u64,
    pub embedding: EmbeddingConfig,
    /// Concurrent batch items; unset means available parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_concurrency: Option<usize>,
    pub tie_break: TieBreak,
    /// Ordered pre-filter rules, first match wins
    pub prefilter: Vec<PrefilterRule>,
    pub assets: AssetPaths,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    /// Offline token-hashing embedding
    Hashed { dim: usize },
    /// Ollama `/api/embed`
    Ollama { model: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPaths {
    pub policies: PathBuf,
    pub exemplars: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            labels: LabelSet::review_default(),
            top_k: DEFAULT_TOP_K,
            decoding: DecodingOptions::default(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            embedding: EmbeddingConfig::default(),
            batch_concurrency: None,
            tie_break: TieBreak::default(),
            prefilter: default_rules(),
            assets: AssetPaths::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Hashed {
            dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            policies: PathBuf::from("assets/policies.md"),
            exemplars: PathBuf::from("assets/exemplars.json"),
        }
    }
}

impl ClassifierConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ContractError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Batch worker count, never zero
    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
            .filter(|n| *n > 0)
            .unwrap_or_else(default_concurrency)
    }

    /// Check cross-field constraints the types cannot express.
    ///
    /// Label set emptiness, duplicates and reserved names are already
    /// rejected when the set is deserialized.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.models.is_empty() {
            return Err(ContractError::ConfigError(
                "at least one model is required".to_string(),
            ));
        }
        if let Some(blank) = self.models.iter().find(|m| m.trim().is_empty()) {
            return Err(ContractError::ConfigError(format!(
                "model id '{}' is blank",
                blank
            )));
        }
        if self.top_k == 0 {
            return Err(ContractError::ConfigError(
                "top_k must be at least 1".to_string(),
            ));
        }
        let t = self.decoding.temperature;
        if !(0.0..=2.0).contains(&t) {
            return Err(ContractError::ConfigError(format!(
                "temperature {} is outside [0, 2]",
                t
            )));
        }
        let p = self.decoding.top_p;
        if !(p > 0.0 && p <= 1.0) {
            return Err(ContractError::ConfigError(format!(
                "top_p {} is outside (0, 1]",
                p
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ContractError::ConfigError(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if let EmbeddingConfig::Hashed { dim } = self.embedding {
            if dim < 8 {
                return Err(ContractError::ConfigError(format!(
                    "hashed embedding dimension {} is below 8",
                    dim
                )));
            }
        }
        // Compiling the rules checks their labels and patterns.
        PreFilter::new(&self.prefilter, &self.labels)?;
        Ok(())
    }
}

pub(crate) fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
