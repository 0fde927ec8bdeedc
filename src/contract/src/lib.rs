// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Review Contract - Requests, results and the classification pipeline
//!
//! This crate defines the complete contract for classifying a review:
//! - **Inputs**: What the classifier receives (`ClassificationRequest`, `ReviewItem`)
//! - **Outputs**: What it returns (`ClassificationResult`, `VoteTally`)
//! - **Pipeline**: Pre-filter, retrieval, prompt, ensemble, vote (`ReviewClassifier`)
//! - **Audit Log Format**: Structured records that never carry review text
//!
//! Recoverable failures never surface as errors: a failing model becomes an
//! `unknown` vote and a failing batch item becomes an `error` result. Only
//! bad configuration, missing assets and malformed batch input are errors.

mod classifier;
mod config;
mod prompt;
mod vote;

pub use classifier::{BatchMetadata, Plan, ReviewClassifier, ReviewItem};
pub use config::{
    AssetPaths, ClassifierConfig, EmbeddingConfig, DEFAULT_EMBEDDING_DIM, DEFAULT_OLLAMA_URL,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TOP_K,
};
pub use prompt::{build_prompt, REVIEW_MARKER};
pub use vote::{aggregate, aggregate_with, TieBreak, VoteTally};

use chrono::{DateTime, Utc};
use model_ensemble::{ModelError, ModelVote};
use passage_retrieval::RetrievalError;
use review_oracle::{Label, OracleError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// CONTRACT VERSION
// ============================================================================

/// Contract version for compatibility checking
pub const CONTRACT_VERSION: &str = "0.1.0";

/// Contract schema identifier
pub const CONTRACT_SCHEMA: &str = "review-gate-contract-v1";

/// Rationale attached to every vote of a pre-filtered review
pub const PREFILTER_RATIONALE: &str = "Detected by pre-filter";

// ============================================================================
// INPUTS - What the classifier receives
// ============================================================================

/// Shop metadata shown to the models, rendered one `key: value` line each.
///
/// Keys are kept sorted so the rendered block is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopInfo(BTreeMap<String, String>);

impl ShopInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One review to classify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Unique request identifier for tracing
    pub request_id: Uuid,

    /// Timestamp when request was created
    pub timestamp: DateTime<Utc>,

    /// The review text; must not be blank
    pub text: String,

    /// Optional shop metadata (empty means none)
    #[serde(default, skip_serializing_if = "ShopInfo::is_empty")]
    pub shop_info: ShopInfo,

    /// Passages to retrieve; `None` uses the classifier's configured value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Include per-model votes and the tally in the result
    pub show_rationale: bool,
}

impl ClassificationRequest {
    /// Create a request with rationale shown and default retrieval depth
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            text: text.into(),
            shop_info: ShopInfo::default(),
            top_k: None,
            show_rationale: true,
        }
    }

    /// Builder: attach shop metadata
    pub fn with_shop_info(mut self, shop_info: ShopInfo) -> Self {
        self.shop_info = shop_info;
        self
    }

    /// Builder: override retrieval depth
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Builder: include or omit votes in the result
    pub fn with_rationale(mut self, show: bool) -> Self {
        self.show_rationale = show;
        self
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if self.text.trim().is_empty() {
            return Err(ContractError::InvalidRequest(
                "review text is empty".to_string(),
            ));
        }
        if self.top_k == Some(0) {
            return Err(ContractError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn shop(&self) -> Option<&ShopInfo> {
        (!self.shop_info.is_empty()).then_some(&self.shop_info)
    }
}

// ============================================================================
// OUTPUTS - What the classifier returns
// ============================================================================

/// Which stage produced the final label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// A pre-filter rule short-circuited the pipeline
    Prefilter,
    /// The ensemble voted
    Ensemble,
    /// Classification raised an error (batch entries only)
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prefilter => "prefilter",
            Stage::Ensemble => "ensemble",
            Stage::Failed => "failed",
        }
    }
}

/// Complete classification outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Request ID for correlation
    pub request_id: Uuid,

    /// Final label (`unknown` when undecidable, `error` when failed)
    pub label: Label,

    pub stage: Stage,

    /// Label counts across the ensemble; omitted without rationale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteTally>,

    /// Per-model votes in ensemble order; omitted without rationale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_outputs: Option<Vec<ModelVote>>,

    /// Pre-filter rule that fired, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefilter_rule: Option<String>,

    /// Number of context passages placed in the prompt
    #[serde(default)]
    pub passages_retrieved: usize,

    /// Failure message for `error` results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Processing duration in microseconds
    #[serde(default)]
    pub duration_us: u64,
}

impl ClassificationResult {
    /// A batch entry whose classification raised an error
    pub fn failed(request_id: Uuid, error: &ContractError) -> Self {
        Self {
            request_id,
            label: Label::error(),
            stage: Stage::Failed,
            votes: None,
            model_outputs: None,
            prefilter_rule: None,
            passages_retrieved: 0,
            error: Some(error.to_string()),
            duration_us: 0,
        }
    }

    /// Whether a real label was assigned
    pub fn is_determined(&self) -> bool {
        !(self.label.is_unknown() || self.label.is_error())
    }

    /// Convert to exit code for CLI usage
    pub fn exit_code(&self) -> i32 {
        if self.is_determined() {
            0
        } else {
            2
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// AUDIT LOG FORMAT - Structured logging without review content
// ============================================================================

/// Audit record for one classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry schema version
    pub schema: String,

    /// Unique audit entry ID
    pub audit_id: Uuid,

    /// Request ID for correlation
    pub request_id: Uuid,

    pub timestamp: DateTime<Utc>,

    pub label: Label,

    pub stage: Stage,

    /// Tally, recorded even when the result omits it
    pub votes: Option<VoteTally>,

    /// `model=label` per ensemble member
    pub model_labels: Vec<String>,

    pub prefilter_rule: Option<String>,

    pub error: Option<String>,

    /// Processing duration in microseconds
    pub duration_us: u64,

    /// Contract version
    pub contract_version: String,

    /// Hash of the review text (for correlation without storing content)
    pub content_hash: String,
}

impl AuditEntry {
    /// Create an audit entry from a request and its result
    pub fn from_result(request: &ClassificationRequest, result: &ClassificationResult) -> Self {
        Self::from_text(&request.text, result)
    }

    /// Create an audit entry from the classified text and its result
    pub fn from_text(text: &str, result: &ClassificationResult) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let content_hash = format!("{:016x}", hasher.finish());

        let model_labels = result
            .model_outputs
            .as_ref()
            .map(|votes| {
                votes
                    .iter()
                    .map(|v| format!("{}={}", v.model, v.label))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            schema: CONTRACT_SCHEMA.to_string(),
            audit_id: Uuid::new_v4(),
            request_id: result.request_id,
            timestamp: Utc::now(),
            label: result.label.clone(),
            stage: result.stage,
            votes: result.votes.clone(),
            model_labels,
            prefilter_rule: result.prefilter_rule.clone(),
            error: result.error.clone(),
            duration_us: result.duration_us,
            contract_version: CONTRACT_VERSION.to_string(),
            content_hash,
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON for debugging
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// CONTRACT ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Batch input shape violates the caller contract
    #[error("Invalid batch input: {0}")]
    InputValidation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Oracle error: {0}")]
    OracleError(#[from] OracleError),

    #[error("Retrieval error: {0}")]
    RetrievalError(#[from] RetrievalError),

    #[error("Model error: {0}")]
    ModelError(#[from] ModelError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(label: &str) -> ClassificationResult {
        let votes = vec![
            ModelVote {
                model: "llama2:7b".to_string(),
                label: Label::new(label),
                rationale: "r".to_string(),
            },
            ModelVote {
                model: "gemma3:4b".to_string(),
                label: Label::new(label),
                rationale: "r".to_string(),
            },
        ];
        ClassificationResult {
            request_id: Uuid::new_v4(),
            label: Label::new(label),
            stage: Stage::Ensemble,
            votes: Some(VoteTally::from_votes(&votes)),
            model_outputs: Some(votes),
            prefilter_rule: None,
            passages_retrieved: 3,
            error: None,
            duration_us: 42,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(ClassificationRequest::new("Lovely staff").validate().is_ok());
        assert!(matches!(
            ClassificationRequest::new("   \n").validate(),
            Err(ContractError::InvalidRequest(_))
        ));
        assert!(ClassificationRequest::new("ok").with_top_k(0).validate().is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = ClassificationRequest::new("Great pizza")
            .with_shop_info(ShopInfo::from_pairs([("Name", "Pizza Town")]))
            .with_top_k(5)
            .with_rationale(false);
        assert_eq!(request.top_k, Some(5));
        assert!(!request.show_rationale);
        assert_eq!(request.shop().and_then(|s| s.get("Name")), Some("Pizza Town"));
        assert!(ClassificationRequest::new("x").shop().is_none());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(sample_result("Valid").exit_code(), 0);
        assert_eq!(sample_result("unknown").exit_code(), 2);
        let failed = ClassificationResult::failed(
            Uuid::new_v4(),
            &ContractError::InvalidRequest("empty".to_string()),
        );
        assert_eq!(failed.exit_code(), 2);
        assert!(failed.label.is_error());
        assert_eq!(failed.stage, Stage::Failed);
    }

    #[test]
    fn test_result_without_rationale_omits_votes() {
        let mut result = sample_result("Valid");
        result.votes = None;
        result.model_outputs = None;
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["label"], "Valid");
        assert_eq!(json["stage"], "ensemble");
        assert!(json.get("votes").is_none());
        assert!(json.get("model_outputs").is_none());
    }

    #[test]
    fn test_audit_entry_never_carries_text() {
        let request = ClassificationRequest::new("secret review text");
        let mut result = sample_result("Valid");
        result.request_id = request.request_id;
        let audit = AuditEntry::from_result(&request, &result);

        assert_eq!(audit.schema, CONTRACT_SCHEMA);
        assert_eq!(audit.request_id, request.request_id);
        assert_eq!(audit.content_hash.len(), 16);
        assert_eq!(audit.model_labels, vec!["llama2:7b=Valid", "gemma3:4b=Valid"]);

        let json = audit.to_json().unwrap();
        assert!(!json.contains("secret review text"));
    }
}
