use crate::backend::ModelBackend;
use crate::parse::parse_model_output;
use crate::{DecodingOptions, ModelError, ModelVote, RawOutput};
use futures::future::join_all;
use review_oracle::{Label, LabelSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fans one prompt out to every model and joins the answers.
#[derive(Clone)]
pub struct EnsembleRunner {
    backend: Arc<dyn ModelBackend>,
    options: DecodingOptions,
    timeout: Option<Duration>,
}

impl EnsembleRunner {
    pub fn new(backend: Arc<dyn ModelBackend>, options: DecodingOptions) -> Self {
        Self {
            backend,
            options,
            timeout: None,
        }
    }

    /// Per-call deadline; a model that misses it yields a failed output.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Invoke every model concurrently with the same prompt.
    ///
    /// All calls are spawned before any is awaited. The result has one entry
    /// per model id, in the order given, whatever order the calls finish in.
    /// Failures (errors, timeouts, panics) are captured per model.
    pub async fn run(&self, prompt: &str, models: &[String]) -> Vec<RawOutput> {
        let prompt: Arc<str> = Arc::from(prompt);

        let handles: Vec<_> = models
            .iter()
            .map(|model| {
                let backend = Arc::clone(&self.backend);
                let prompt = Arc::clone(&prompt);
                let model = model.clone();
                let options = self.options;
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let start = Instant::now();
                    let result = invoke(backend.as_ref(), &model, &prompt, &options, timeout).await;
                    (result, start.elapsed())
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(models)
            .map(|(joined, model)| {
                let (result, elapsed) = match joined {
                    Ok(done) => done,
                    Err(e) => (
                        Err(ModelError::Backend(format!("model task failed: {}", e))),
                        Duration::ZERO,
                    ),
                };
                let latency_ms = elapsed.as_millis() as u64;

                match result {
                    Ok(text) => {
                        debug!(model = %model, latency_ms, "model answered");
                        RawOutput {
                            model: model.clone(),
                            text,
                            error: None,
                            latency_ms,
                        }
                    }
                    Err(e) => {
                        warn!(model = %model, latency_ms, error = %e, "model invocation failed");
                        RawOutput {
                            model: model.clone(),
                            text: String::new(),
                            error: Some(e.to_string()),
                            latency_ms,
                        }
                    }
                }
            })
            .collect()
    }

    /// Run the ensemble and turn each raw output into a vote.
    pub async fn vote(&self, prompt: &str, models: &[String], labels: &LabelSet) -> Vec<ModelVote> {
        self.run(prompt, models)
            .await
            .into_iter()
            .map(|raw| to_vote(raw, labels))
            .collect()
    }
}

async fn invoke(
    backend: &dyn ModelBackend,
    model: &str,
    prompt: &str,
    options: &DecodingOptions,
    timeout: Option<Duration>,
) -> Result<String, ModelError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.generate(model, prompt, options))
            .await
            .map_err(|_| ModelError::Timeout {
                model: model.to_string(),
                secs: limit.as_secs(),
            })?,
        None => backend.generate(model, prompt, options).await,
    }
}

/// Parse a raw output and map its label onto the label set.
///
/// Failed calls and labels outside the set both become `unknown`; the
/// rationale keeps whatever explains why.
pub fn to_vote(raw: RawOutput, labels: &LabelSet) -> ModelVote {
    if let Some(error) = raw.error {
        return ModelVote {
            model: raw.model,
            label: Label::unknown(),
            rationale: format!("model invocation failed: {}", error),
        };
    }

    let parsed = parse_model_output(&raw.text);
    let label = labels.normalize(&parsed.label);
    if label.is_unknown() && parsed.label != review_oracle::UNKNOWN_LABEL {
        debug!(model = %raw.model, returned = %parsed.label, "label outside label set");
    }

    ModelVote {
        model: raw.model,
        label,
        rationale: parsed.rationale,
    }
}
