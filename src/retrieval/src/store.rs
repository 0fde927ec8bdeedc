use crate::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Where a passage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassageSource {
    Policy,
    Exemplar,
}

/// An immutable retrievable text unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source: PassageSource,
}

/// One record of the exemplar collection. Only `text` is required; the
/// label is carried for humans reading the asset and is not interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemplar {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Fixed ordered collection of policy passages followed by exemplar passages.
#[derive(Debug, Clone, Default)]
pub struct PassageStore {
    passages: Vec<Passage>,
}

impl PassageStore {
    /// Split the policy document into paragraphs and append one passage per
    /// exemplar, policy passages first.
    pub fn build(policy_text: &str, exemplars: &[Exemplar]) -> Self {
        let mut passages: Vec<Passage> = split_paragraphs(policy_text)
            .into_iter()
            .map(|text| Passage {
                text,
                source: PassageSource::Policy,
            })
            .collect();

        passages.extend(exemplars.iter().map(|e| Passage {
            text: e.text.clone(),
            source: PassageSource::Exemplar,
        }));

        Self { passages }
    }

    /// Read both assets from disk. Any missing file or malformed record is
    /// fatal: the classifier cannot serve without its context.
    pub fn load(policy_path: &Path, exemplar_path: &Path) -> Result<Self, RetrievalError> {
        let policy_text = fs::read_to_string(policy_path).map_err(|e| RetrievalError::AssetLoad {
            path: policy_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let raw = fs::read_to_string(exemplar_path).map_err(|e| RetrievalError::AssetLoad {
            path: exemplar_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let exemplars: Vec<Exemplar> =
            serde_json::from_str(&raw).map_err(|e| RetrievalError::AssetLoad {
                path: exemplar_path.to_path_buf(),
                reason: format!("malformed exemplar collection: {}", e),
            })?;

        let store = Self::build(&policy_text, &exemplars);
        if store.is_empty() {
            warn!(
                policies = %policy_path.display(),
                exemplars = %exemplar_path.display(),
                "passage store is empty; prompts will carry no context"
            );
        }
        info!(
            policy_passages = store.count(PassageSource::Policy),
            exemplar_passages = store.count(PassageSource::Exemplar),
            "loaded passage store"
        );
        Ok(store)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Number of passages from one source
    pub fn count(&self, source: PassageSource) -> usize {
        self.passages.iter().filter(|p| p.source == source).count()
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&Passage> {
        self.passages.get(idx)
    }
}

/// Paragraphs separated by one or more blank lines, trimmed, empties dropped.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut paragraphs);

    paragraphs
}

fn flush(current: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let joined = current.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    current.clear();
}
