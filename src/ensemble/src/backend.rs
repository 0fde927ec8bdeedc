use crate::{DecodingOptions, ModelError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// The model invocation boundary: one prompt in, raw text out.
///
/// Calls are independent and stateless; implementations must be safe to call
/// concurrently for different models.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &DecodingOptions,
    ) -> Result<String, ModelError>;
}

/// Chat completions from a local Ollama server (`/api/chat`).
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    options: &'a DecodingOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    /// `base_url` should be like `http://localhost:11434` (no trailing slash).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &DecodingOptions,
    ) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, model, prompt_chars = prompt.len(), "calling model");

        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options,
        };

        let resp = self.client.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        // A response without a message is an empty answer, not an error.
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let options = DecodingOptions::default();
        let request = ChatRequest {
            model: "gemma3:4b",
            messages: [ChatMessage {
                role: "user",
                content: "classify this",
            }],
            stream: false,
            options: &options,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "classify this");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_ctx"], 2048);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert!((json["options"]["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_chat_response_without_message_is_empty() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(parsed.message.is_none());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": "hi"}}"#).unwrap();
        assert_eq!(parsed.message.unwrap().content, "hi");
    }

    #[test]
    fn test_backend_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:11434");
    }
}
