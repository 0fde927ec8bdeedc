// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! The classification pipeline and batch runner

use crate::config::{default_concurrency, ClassifierConfig, EmbeddingConfig, DEFAULT_TOP_K};
use crate::prompt::build_prompt;
use crate::vote::{aggregate_with, TieBreak, VoteTally};
use crate::{
    ClassificationRequest, ClassificationResult, ContractError, ShopInfo, Stage,
    PREFILTER_RATIONALE,
};
use futures::stream::{self, StreamExt};
use model_ensemble::{EnsembleRunner, ModelVote, OllamaBackend};
use passage_retrieval::{
    Embedder, HashedEmbedder, OllamaEmbedder, PassageStore, Retriever, ScoredPassage,
};
use review_oracle::{LabelSet, PreFilter, PrefilterHit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// BATCH INPUT
// ============================================================================

/// One batch entry: a bare review, or a review with the business it is about.
///
/// In JSON a plain review is a string and a shop review is a
/// `[text, business_name]` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewItem {
    Plain(String),
    Shop(String, String),
}

impl ReviewItem {
    pub fn text(&self) -> &str {
        match self {
            ReviewItem::Plain(text) | ReviewItem::Shop(text, _) => text,
        }
    }

    pub fn business(&self) -> Option<&str> {
        match self {
            ReviewItem::Plain(_) => None,
            ReviewItem::Shop(_, business) => Some(business),
        }
    }

    /// Parse a JSON batch: all strings, or all `[text, business]` pairs.
    ///
    /// Anything else, including a mix of the two shapes, is rejected whole.
    pub fn parse_list(value: &Value) -> Result<Vec<ReviewItem>, ContractError> {
        let entries = value.as_array().ok_or_else(|| {
            ContractError::InputValidation("reviews must be a JSON array".to_string())
        })?;

        let items = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Value::String(text) => Ok(ReviewItem::Plain(text.clone())),
                Value::Array(pair) => match pair.as_slice() {
                    [Value::String(text), Value::String(business)] => {
                        Ok(ReviewItem::Shop(text.clone(), business.clone()))
                    }
                    _ => Err(ContractError::InputValidation(format!(
                        "entry {} is not a [review_text, business_name] pair",
                        i
                    ))),
                },
                _ => Err(ContractError::InputValidation(format!(
                    "entry {} is neither a string nor a pair",
                    i
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        check_uniform(&items)?;
        Ok(items)
    }
}

fn check_uniform(items: &[ReviewItem]) -> Result<(), ContractError> {
    let plain = items
        .iter()
        .filter(|i| matches!(i, ReviewItem::Plain(_)))
        .count();
    if plain != 0 && plain != items.len() {
        return Err(ContractError::InputValidation(format!(
            "reviews must be all strings or all (review_text, business_name) pairs, got {} strings and {} pairs",
            plain,
            items.len() - plain
        )));
    }
    Ok(())
}

/// Shop metadata for a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// Shared by every plain review
    #[serde(default)]
    pub global: ShopInfo,
    /// Looked up per business for shop reviews; a missing business means no metadata
    #[serde(default)]
    pub by_business: HashMap<String, ShopInfo>,
}

impl BatchMetadata {
    pub fn global(info: ShopInfo) -> Self {
        Self {
            global: info,
            by_business: HashMap::new(),
        }
    }

    pub fn by_business(map: HashMap<String, ShopInfo>) -> Self {
        Self {
            global: ShopInfo::default(),
            by_business: map,
        }
    }

    fn for_item(&self, item: &ReviewItem) -> ShopInfo {
        match item.business() {
            None => self.global.clone(),
            Some(business) => self.by_business.get(business).cloned().unwrap_or_default(),
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// What classifying a request will do, before any model is called
#[derive(Debug, Clone)]
pub enum Plan {
    /// A pre-filter rule decides; nothing else runs
    ShortCircuit(PrefilterHit),
    /// Retrieval done, prompt ready for the ensemble
    Ensemble {
        passages: Vec<ScoredPassage>,
        prompt: String,
    },
}

/// Pre-filter, retrieve, prompt, fan out, vote.
///
/// Immutable after construction; safe to share across concurrent requests.
pub struct ReviewClassifier {
    labels: LabelSet,
    prefilter: PreFilter,
    retriever: Retriever,
    ensemble: EnsembleRunner,
    models: Vec<String>,
    top_k: usize,
    tie_break: TieBreak,
    batch_concurrency: usize,
}

impl ReviewClassifier {
    /// Create a classifier with the review label set and default rules
    pub fn new(retriever: Retriever, ensemble: EnsembleRunner, models: Vec<String>) -> Self {
        Self {
            labels: LabelSet::review_default(),
            prefilter: PreFilter::with_review_defaults(),
            retriever,
            ensemble,
            models,
            top_k: DEFAULT_TOP_K,
            tie_break: TieBreak::default(),
            batch_concurrency: default_concurrency(),
        }
    }

    /// Builder: custom labels with rules compiled against them
    pub fn with_labels(mut self, labels: LabelSet, prefilter: PreFilter) -> Self {
        self.labels = labels;
        self.prefilter = prefilter;
        self
    }

    /// Builder: default retrieval depth
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Builder: tie-break policy
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Builder: concurrent batch items
    pub fn with_batch_concurrency(mut self, n: usize) -> Self {
        self.batch_concurrency = n.max(1);
        self
    }

    /// Build everything a config describes: load assets, embed the
    /// passages, connect to the model server.
    pub async fn from_config(config: &ClassifierConfig) -> Result<Self, ContractError> {
        config.validate()?;

        let prefilter = PreFilter::new(&config.prefilter, &config.labels)?;
        let store = PassageStore::load(&config.assets.policies, &config.assets.exemplars)?;

        let timeout = config.request_timeout();
        let embedder: Arc<dyn Embedder> = match &config.embedding {
            EmbeddingConfig::Hashed { dim } => Arc::new(HashedEmbedder::new(*dim)),
            EmbeddingConfig::Ollama { model } => Arc::new(OllamaEmbedder::new(
                config.ollama_url.as_str(),
                model.as_str(),
                timeout,
            )?),
        };
        let retriever = Retriever::build(store, embedder).await?;

        let backend = OllamaBackend::new(config.ollama_url.as_str(), timeout)?;
        let ensemble = EnsembleRunner::new(Arc::new(backend), config.decoding).with_timeout(timeout);

        info!(
            models = ?config.models,
            labels = config.labels.len(),
            rules = prefilter.rule_count(),
            passages = retriever.store().len(),
            "classifier ready"
        );

        Ok(Self::new(retriever, ensemble, config.models.clone())
            .with_labels(config.labels.clone(), prefilter)
            .with_top_k(config.top_k)
            .with_tie_break(config.tie_break)
            .with_batch_concurrency(config.batch_concurrency()))
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run the pre-filter and, if it does not fire, retrieval and prompt
    /// construction. No model is called.
    pub async fn plan(&self, request: &ClassificationRequest) -> Result<Plan, ContractError> {
        request.validate()?;

        if let Some(hit) = self.prefilter.check(&request.text) {
            return Ok(Plan::ShortCircuit(hit));
        }

        let top_k = request.top_k.unwrap_or(self.top_k);
        let passages = self.retriever.query(&request.text, top_k).await?;
        let context: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let prompt = build_prompt(&request.text, &context, request.shop(), &self.labels);

        Ok(Plan::Ensemble { passages, prompt })
    }

    /// Classify one review
    pub async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ContractError> {
        let start = Instant::now();

        let (label, stage, votes, rule, passages_retrieved) = match self.plan(request).await? {
            Plan::ShortCircuit(hit) => {
                info!(
                    request_id = %request.request_id,
                    rule = %hit.rule,
                    label = %hit.label,
                    "pre-filter short-circuit"
                );
                let rationale = format!("{} ({})", PREFILTER_RATIONALE, hit.rule);
                let votes: Vec<ModelVote> = self
                    .models
                    .iter()
                    .map(|model| ModelVote {
                        model: model.clone(),
                        label: hit.label.clone(),
                        rationale: rationale.clone(),
                    })
                    .collect();
                (hit.label, Stage::Prefilter, votes, Some(hit.rule), 0)
            }
            Plan::Ensemble { passages, prompt } => {
                debug!(
                    request_id = %request.request_id,
                    passages = passages.len(),
                    prompt_chars = prompt.len(),
                    "dispatching ensemble"
                );
                let votes = self.ensemble.vote(&prompt, &self.models, &self.labels).await;
                let (label, _) = aggregate_with(&votes, self.tie_break, &self.labels);
                (label, Stage::Ensemble, votes, None, passages.len())
            }
        };

        let tally = VoteTally::from_votes(&votes);
        info!(
            request_id = %request.request_id,
            label = %label,
            stage = stage.as_str(),
            tally = ?tally,
            "classified review"
        );

        let (votes, model_outputs) = if request.show_rationale {
            (Some(tally), Some(votes))
        } else {
            (None, None)
        };

        Ok(ClassificationResult {
            request_id: request.request_id,
            label,
            stage,
            votes,
            model_outputs,
            prefilter_rule: rule,
            passages_retrieved,
            error: None,
            duration_us: start.elapsed().as_micros() as u64,
        })
    }

    /// Classify many reviews, one result per item in input order.
    ///
    /// Items run concurrently, at most `batch_concurrency` at a time. An item
    /// that fails becomes an `error` result; the batch carries on. Input that
    /// mixes plain and shop reviews is rejected before anything runs.
    pub async fn classify_batch(
        &self,
        items: &[ReviewItem],
        metadata: &BatchMetadata,
        show_rationale: bool,
    ) -> Result<Vec<ClassificationResult>, ContractError> {
        check_uniform(items)?;

        let requests: Vec<ClassificationRequest> = items
            .iter()
            .map(|item| {
                ClassificationRequest::new(item.text())
                    .with_shop_info(metadata.for_item(item))
                    .with_rationale(show_rationale)
            })
            .collect();

        info!(
            items = requests.len(),
            concurrency = self.batch_concurrency,
            "starting batch"
        );

        let results: Vec<ClassificationResult> = stream::iter(requests.iter().enumerate())
            .map(|(index, request)| async move {
                match self.classify(request).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(index, request_id = %request.request_id, error = %e, "batch item failed");
                        ClassificationResult::failed(request.request_id, &e)
                    }
                }
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.stage == Stage::Failed).count();
        info!(items = results.len(), failed, "batch complete");

        Ok(results)
    }
}
