//! Model Ensemble - Concurrent LLM invocation for review classification
//!
//! Every configured model receives the identical prompt with fixed decoding
//! options. Calls are dispatched together and joined before anything is
//! aggregated; one model failing, timing out or rambling never affects the
//! others. Raw text is turned into a label/rationale pair by a best-effort
//! parser that degrades to `unknown` instead of failing.
//!
//! The only place a real language model is reached is [`ModelBackend`];
//! [`OllamaBackend`] talks to a local Ollama server.

mod backend;
mod parse;
mod runner;

pub use backend::{ModelBackend, OllamaBackend};
pub use parse::{parse_model_output, ParsedOutput};
pub use runner::EnsembleRunner;

use review_oracle::Label;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ensemble, in vote order
pub const DEFAULT_MODELS: &[&str] = &["llama2:7b", "deepseek-r1:7b", "gemma3:4b"];

/// Fixed decoding options sent with every model call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodingOptions {
    pub num_ctx: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            num_ctx: 2048,
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

/// Raw response of one model, in ensemble order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOutput {
    pub model: String,
    pub text: String,
    /// Set when the call failed; `text` is then empty
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl RawOutput {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// One model's classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVote {
    pub model: String,
    pub label: Label,
    pub rationale: String,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Model '{model}' timed out after {secs}s")]
    Timeout { model: String, secs: u64 },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model backend error: {0}")]
    Backend(String),
}
